//! Per-operation access decisions.
//!
//! Every function here is pure: it receives the caller and the stored record
//! (or the facts needed about it) and answers allow/deny. Services evaluate
//! the relevant rule before any mutating call.

use log::warn;

use crate::auth::AuthUser;
use crate::entity::resource::Visibility;
use crate::entity::user::Role;
use crate::entity::{answer, course, question, resource};
use crate::error::AppError;

pub fn ensure(allowed: bool, caller: &AuthUser, msg: &str) -> Result<(), AppError> {
    if allowed {
        return Ok(());
    }
    warn!("denied {} ({}): {}", caller.username, caller.role.as_str(), msg);
    Err(AppError::forbidden(msg))
}

pub fn require_role(caller: &AuthUser, role: Role, msg: &str) -> Result<(), AppError> {
    ensure(caller.has_role(role), caller, msg)
}

pub fn may_create_course(caller: &AuthUser) -> bool {
    caller.has_role(Role::Teacher)
}

/// Admin, or the teacher currently stored as the course owner.
pub fn may_edit_course(caller: &AuthUser, course: &course::Model) -> bool {
    caller.is_admin() || (caller.has_role(Role::Teacher) && course.teacher_id == caller.user_id)
}

pub fn may_modify_question(caller: &AuthUser, question: &question::Model) -> bool {
    caller.is_admin() || question.asker_id == caller.user_id
}

pub fn may_modify_answer(caller: &AuthUser, answer: &answer::Model) -> bool {
    caller.is_admin() || answer.replier_id == caller.user_id
}

pub fn may_modify_resource(caller: &AuthUser, resource: &resource::Model) -> bool {
    caller.is_admin() || resource.uploader_id == caller.user_id
}

/// `taught` must be the live list of course ids owned by the caller.
pub fn may_answer_in(caller: &AuthUser, taught: &[i32], course_id: i32) -> bool {
    caller.has_role(Role::Teacher) && taught.contains(&course_id)
}

/// Teachers may only upload into courses they own; everyone else may upload anywhere.
pub fn may_upload_to(caller: &AuthUser, course: &course::Model) -> bool {
    !caller.has_role(Role::Teacher) || course.teacher_id == caller.user_id
}

/// CLASS_ONLY is honored for teachers only; anything else falls back to ALL.
pub fn effective_visibility(caller: &AuthUser, requested: Option<Visibility>) -> Visibility {
    match requested {
        Some(Visibility::ClassOnly) if caller.has_role(Role::Teacher) => Visibility::ClassOnly,
        _ => Visibility::All,
    }
}

/// Visibility values the caller may list or download within `course_id`.
///
/// Students only ever see ALL: there is no enrollment model to decide which
/// class a student belongs to.
pub fn visible_scopes(caller: &AuthUser, taught: &[i32], course_id: i32) -> Vec<Visibility> {
    match caller.role {
        Role::Admin => vec![Visibility::All, Visibility::ClassOnly],
        Role::Teacher if taught.contains(&course_id) => vec![Visibility::All, Visibility::ClassOnly],
        Role::Teacher | Role::Student => vec![Visibility::All],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller(id: i32, role: Role) -> AuthUser {
        AuthUser {
            user_id: id,
            username: format!("u{}", id),
            role,
        }
    }

    fn course(teacher_id: i32) -> course::Model {
        course::Model {
            id: 7,
            name: "Compilers".to_string(),
            description: None,
            college: None,
            teacher_id,
        }
    }

    #[test]
    fn course_edit_requires_admin_or_current_owner() {
        let c = course(2);
        assert!(may_edit_course(&caller(1, Role::Admin), &c));
        assert!(may_edit_course(&caller(2, Role::Teacher), &c));
        assert!(!may_edit_course(&caller(3, Role::Teacher), &c));
        // a student whose id happens to match is still not an owner
        assert!(!may_edit_course(&caller(2, Role::Student), &c));
    }

    #[test]
    fn only_teachers_keep_class_only() {
        assert_eq!(
            effective_visibility(&caller(1, Role::Teacher), Some(Visibility::ClassOnly)),
            Visibility::ClassOnly
        );
        assert_eq!(
            effective_visibility(&caller(1, Role::Student), Some(Visibility::ClassOnly)),
            Visibility::All
        );
        assert_eq!(
            effective_visibility(&caller(1, Role::Admin), Some(Visibility::ClassOnly)),
            Visibility::All
        );
        assert_eq!(effective_visibility(&caller(1, Role::Teacher), None), Visibility::All);
    }

    #[test]
    fn scopes_follow_role_and_ownership() {
        let both = vec![Visibility::All, Visibility::ClassOnly];
        assert_eq!(visible_scopes(&caller(1, Role::Admin), &[], 7), both);
        assert_eq!(visible_scopes(&caller(2, Role::Teacher), &[7], 7), both);
        assert_eq!(visible_scopes(&caller(2, Role::Teacher), &[8], 7), vec![Visibility::All]);
        assert_eq!(visible_scopes(&caller(3, Role::Student), &[7], 7), vec![Visibility::All]);
    }

    #[test]
    fn teacher_upload_requires_ownership() {
        assert!(may_upload_to(&caller(2, Role::Teacher), &course(2)));
        assert!(!may_upload_to(&caller(3, Role::Teacher), &course(2)));
        assert!(may_upload_to(&caller(4, Role::Student), &course(2)));
    }

    #[test]
    fn answering_checks_live_course_list() {
        let teacher = caller(2, Role::Teacher);
        assert!(may_answer_in(&teacher, &[7, 9], 7));
        assert!(!may_answer_in(&teacher, &[9], 7));
        assert!(!may_answer_in(&caller(1, Role::Admin), &[7], 7));
    }
}
