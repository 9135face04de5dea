use crate::error::AppError;

/// Collects every field failure of a request body so they can be reported together.
#[derive(Default)]
pub struct Validator {
    errors: Vec<String>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required<T>(&mut self, field: &str, value: &Option<T>) -> &mut Self {
        if value.is_none() {
            self.errors.push(format!("{}: must not be null", field));
        }
        self
    }

    pub fn not_blank(&mut self, field: &str, value: Option<&str>) -> &mut Self {
        if value.map(|v| v.trim().is_empty()).unwrap_or(true) {
            self.errors.push(format!("{}: must not be blank", field));
        }
        self
    }

    pub fn max_len(&mut self, field: &str, value: Option<&str>, max: usize) -> &mut Self {
        if let Some(v) = value {
            if v.chars().count() > max {
                self.errors.push(format!("{}: length must be at most {}", field, max));
            }
        }
        self
    }

    pub fn min_len(&mut self, field: &str, value: Option<&str>, min: usize) -> &mut Self {
        if let Some(v) = value {
            if v.chars().count() < min {
                self.errors.push(format!("{}: length must be at least {}", field, min));
            }
        }
        self
    }

    pub fn finish(&self) -> Result<(), AppError> {
        if self.errors.is_empty() {
            return Ok(());
        }
        Err(AppError::param_error(format!("validation failed: {}", self.errors.join("; "))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregates_every_failure_into_one_message() {
        let title: Option<String> = Some("   ".to_string());
        let content = "x".repeat(5001);
        let course_id: Option<i32> = None;

        let err = Validator::new()
            .not_blank("title", title.as_deref())
            .max_len("content", Some(&content), 5000)
            .required("courseId", &course_id)
            .finish()
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "validation failed: title: must not be blank; content: length must be at most 5000; courseId: must not be null"
        );
    }

    #[test]
    fn counts_characters_not_bytes() {
        let name = "编译原理".to_string();
        assert!(Validator::new().max_len("name", Some(&name), 4).finish().is_ok());
        assert!(Validator::new().min_len("newPassword", Some("12345"), 6).finish().is_err());
    }
}
