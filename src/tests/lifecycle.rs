use actix_web::http::StatusCode;
use actix_web::ResponseError;

use super::{upload, TestEnv};
use crate::entity::question::QuestionStatus;
use crate::entity::user::Role;
use crate::error::AppError;
use crate::service::answer::{self as answer_service, AnswerEdit, AnswerForm};
use crate::service::course::{self as course_service, CourseForm};
use crate::service::question::{self as question_service, QuestionEdit, QuestionFilter, QuestionForm};
use crate::service::{exec_sql, PageRequest};

fn ask(course_id: i32, title: &str) -> QuestionForm {
    QuestionForm {
        title: Some(title.to_string()),
        content: Some("details".to_string()),
        course_id: Some(course_id),
    }
}

fn reply(question_id: i32, content: &str) -> AnswerForm {
    AnswerForm {
        content: Some(content.to_string()),
        question_id: Some(question_id),
    }
}

fn first_page() -> PageRequest {
    PageRequest::new(None, None, 10)
}

#[actix_web::test]
async fn status_tracks_whether_any_answer_exists() {
    let env = TestEnv::new().await;
    let alice = env.user("alice", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;

    let q = question_service::create(&env.db, &env.store, &alice, ask(course.id, "Why does X fail?"), None)
        .await
        .unwrap();
    assert_eq!(q.status, QuestionStatus::Unanswered);
    assert!(q.is_new);

    let first = answer_service::create(&env.db, &env.store, &bob, reply(q.id, "Because Y"), None)
        .await
        .unwrap();
    let second = answer_service::create(&env.db, &env.store, &bob, reply(q.id, "Also Z"), None)
        .await
        .unwrap();
    let q = question_service::find_by_id(&env.db, q.id).await.unwrap();
    assert_eq!(q.status, QuestionStatus::Answered);
    assert!(!q.is_new);

    answer_service::delete(&env.db, &env.store, &bob, first.id).await.unwrap();
    let q = question_service::find_by_id(&env.db, q.id).await.unwrap();
    assert_eq!(q.status, QuestionStatus::Answered, "one answer is still left");

    answer_service::delete(&env.db, &env.store, &bob, second.id).await.unwrap();
    let q = question_service::find_by_id(&env.db, q.id).await.unwrap();
    assert_eq!(q.status, QuestionStatus::Unanswered);
}

#[actix_web::test]
async fn only_the_owning_teacher_may_answer() {
    let env = TestEnv::new().await;
    let alice = env.user("alice", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let carol = env.user("carol", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;
    let q = question_service::create(&env.db, &env.store, &alice, ask(course.id, "q"), None)
        .await
        .unwrap();

    let err = answer_service::create(&env.db, &env.store, &carol, reply(q.id, "not mine"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = answer_service::create(&env.db, &env.store, &alice, reply(q.id, "students cannot"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    assert!(answer_service::list_by_question(&env.db, q.id).await.unwrap().is_empty());
    let q = question_service::find_by_id(&env.db, q.id).await.unwrap();
    assert_eq!(q.status, QuestionStatus::Unanswered);
}

#[actix_web::test]
async fn ownership_is_read_live_after_reassignment() {
    let env = TestEnv::new().await;
    let admin = env.user("root", Role::Admin).await;
    let alice = env.user("alice", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let carol = env.user("carol", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;
    let q = question_service::create(&env.db, &env.store, &alice, ask(course.id, "q"), None)
        .await
        .unwrap();

    crate::service::user::assign_course_to_teacher(&env.db, &admin, Some(course.id), Some(carol.user_id))
        .await
        .unwrap();

    let err = answer_service::create(&env.db, &env.store, &bob, reply(q.id, "late"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    answer_service::create(&env.db, &env.store, &carol, reply(q.id, "mine now"), None)
        .await
        .unwrap();

    let form = CourseForm {
        name: Some("Compilers II".to_string()),
        ..Default::default()
    };
    let err = course_service::update(&env.db, &bob, course.id, form).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[actix_web::test]
async fn invalid_question_input_is_rejected() {
    let env = TestEnv::new().await;
    let alice = env.user("alice", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;

    let err = question_service::create(&env.db, &env.store, &bob, ask(course.id, "q"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)), "teachers cannot ask");

    let err = question_service::create(&env.db, &env.store, &alice, ask(999, "q"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));

    let err = question_service::create(&env.db, &env.store, &alice, ask(course.id, "  "), None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("title: must not be blank"));

    let err = answer_service::create(&env.db, &env.store, &bob, reply(999, "nothing to answer"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
}

#[actix_web::test]
async fn attachments_never_share_a_stored_file() {
    let env = TestEnv::new().await;
    let alice = env.user("alice", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;

    let a = question_service::create(
        &env.db,
        &env.store,
        &alice,
        ask(course.id, "first"),
        Some(upload("notes.txt", b"first body")),
    )
    .await
    .unwrap();
    let b = question_service::create(
        &env.db,
        &env.store,
        &alice,
        ask(course.id, "second"),
        Some(upload("notes.txt", b"second body")),
    )
    .await
    .unwrap();

    assert_ne!(a.attachment_path, b.attachment_path);
    let (data, name) = question_service::attachment(&env.db, &env.store, a.id).await.unwrap();
    assert_eq!(data, b"first body");
    assert_eq!(name, "notes.txt");
    let (data, _) = question_service::attachment(&env.db, &env.store, b.id).await.unwrap();
    assert_eq!(data, b"second body");
}

#[actix_web::test]
async fn deleting_a_question_removes_answers_and_files() {
    let env = TestEnv::new().await;
    let admin = env.user("root", Role::Admin).await;
    let alice = env.user("alice", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;

    let q = question_service::create(
        &env.db,
        &env.store,
        &alice,
        ask(course.id, "q"),
        Some(upload("q.txt", b"question file")),
    )
    .await
    .unwrap();
    answer_service::create(&env.db, &env.store, &bob, reply(q.id, "a"), Some(upload("a.txt", b"answer file")))
        .await
        .unwrap();
    assert_eq!(env.stored_files().len(), 2);

    question_service::delete(&env.db, &env.store, &admin, q.id).await.unwrap();

    assert!(answer_service::list_by_question(&env.db, q.id).await.unwrap().is_empty());
    assert!(matches!(
        question_service::find_by_id(&env.db, q.id).await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(env.stored_files().is_empty());
}

#[actix_web::test]
async fn edits_are_limited_to_owner_or_admin() {
    let env = TestEnv::new().await;
    let admin = env.user("root", Role::Admin).await;
    let alice = env.user("alice", Role::Student).await;
    let dave = env.user("dave", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;
    let q = question_service::create(&env.db, &env.store, &alice, ask(course.id, "q"), None)
        .await
        .unwrap();
    let a = answer_service::create(&env.db, &env.store, &bob, reply(q.id, "a"), None)
        .await
        .unwrap();

    let edit = || QuestionEdit {
        title: Some("edited".to_string()),
        content: Some("edited body".to_string()),
    };
    let err = question_service::update(&env.db, &dave, q.id, edit()).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = question_service::delete(&env.db, &env.store, &dave, q.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let updated = question_service::update(&env.db, &admin, q.id, edit()).await.unwrap();
    assert_eq!(updated.title, "edited");
    assert_eq!(updated.course_id, course.id);
    assert_eq!(updated.asker_id, alice.user_id);

    let err = answer_service::update(
        &env.db,
        &alice,
        a.id,
        AnswerEdit {
            content: Some("hijack".to_string()),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    let err = answer_service::delete(&env.db, &env.store, &alice, a.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[actix_web::test]
async fn unread_answers_are_counted_per_asker() {
    let env = TestEnv::new().await;
    let alice = env.user("alice", Role::Student).await;
    let dave = env.user("dave", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;
    let q = question_service::create(&env.db, &env.store, &alice, ask(course.id, "q"), None)
        .await
        .unwrap();
    answer_service::create(&env.db, &env.store, &bob, reply(q.id, "one"), None)
        .await
        .unwrap();
    answer_service::create(&env.db, &env.store, &bob, reply(q.id, "two"), None)
        .await
        .unwrap();

    assert_eq!(answer_service::count_unread_for_asker(&env.db, alice.user_id).await.unwrap(), 2);
    assert_eq!(answer_service::count_unread_for_asker(&env.db, dave.user_id).await.unwrap(), 0);

    let err = answer_service::mark_read_by_asker(&env.db, &dave, q.id).await.unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(answer_service::mark_read_by_asker(&env.db, &alice, q.id).await.unwrap(), 2);
    assert_eq!(answer_service::count_unread_for_asker(&env.db, alice.user_id).await.unwrap(), 0);
}

#[actix_web::test]
async fn counters_and_global_search() {
    let env = TestEnv::new().await;
    let alice = env.user("alice", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let carol = env.user("carol", Role::Teacher).await;
    let compilers = env.course("Compilers", &bob).await;
    let networks = env.course("Networks", &bob).await;
    let databases = env.course("Databases", &carol).await;

    let q1 = question_service::create(&env.db, &env.store, &alice, ask(compilers.id, "lexer bug"), None)
        .await
        .unwrap();
    question_service::create(&env.db, &env.store, &alice, ask(networks.id, "tcp window"), None)
        .await
        .unwrap();
    question_service::create(&env.db, &env.store, &alice, ask(databases.id, "btree split"), None)
        .await
        .unwrap();
    answer_service::create(&env.db, &env.store, &bob, reply(q1.id, "fixed"), None)
        .await
        .unwrap();

    assert_eq!(question_service::count_by_asker(&env.db, alice.user_id).await.unwrap(), 3);
    assert_eq!(question_service::count_answered_by_asker(&env.db, alice.user_id).await.unwrap(), 1);
    assert_eq!(question_service::count_unanswered_in_course(&env.db, networks.id).await.unwrap(), 1);
    assert_eq!(question_service::count_unanswered_for_teacher(&env.db, bob.user_id).await.unwrap(), 1);
    assert_eq!(question_service::count_unanswered_for_teacher(&env.db, carol.user_id).await.unwrap(), 1);
    let idle = env.user("idle", Role::Teacher).await;
    assert_eq!(question_service::count_unanswered_for_teacher(&env.db, idle.user_id).await.unwrap(), 0);

    let by_teacher = question_service::search_global(
        &env.db,
        QuestionFilter {
            teacher_id: Some(bob.user_id),
            ..Default::default()
        },
        first_page(),
    )
    .await
    .unwrap();
    assert_eq!(by_teacher.total, 2);

    let answered = question_service::search_global(
        &env.db,
        QuestionFilter {
            teacher_id: Some(bob.user_id),
            status: Some(QuestionStatus::Answered),
            ..Default::default()
        },
        first_page(),
    )
    .await
    .unwrap();
    assert_eq!(answered.total, 1);
    assert_eq!(answered.list[0].id, q1.id);

    let keyword = question_service::search(&env.db, compilers.id, Some("LEXER"), None, first_page())
        .await
        .unwrap();
    // sqlite LIKE is case-insensitive for ASCII
    assert_eq!(keyword.total, 1);

    let empty = question_service::search(&env.db, compilers.id, Some("nothing"), None, first_page())
        .await
        .unwrap();
    assert_eq!(empty.total, 0);
    assert!(empty.list.is_empty());

    for course_id in [0, -1] {
        let none = question_service::search(&env.db, course_id, None, None, first_page())
            .await
            .unwrap();
        assert_eq!(none.total, 0, "course id {} matches no course", course_id);
    }
    let unfiltered = question_service::search_global(&env.db, QuestionFilter::default(), first_page())
        .await
        .unwrap();
    assert_eq!(unfiltered.total, 3);
}

#[actix_web::test]
async fn pages_are_newest_first() {
    let env = TestEnv::new().await;
    let alice = env.user("alice", Role::Student).await;
    let bob = env.user("bob", Role::Teacher).await;
    let course = env.course("Compilers", &bob).await;
    for i in 0..5 {
        question_service::create(&env.db, &env.store, &alice, ask(course.id, &format!("q{}", i)), None)
            .await
            .unwrap();
    }

    let page = question_service::list_mine(&env.db, &alice, None, PageRequest::new(Some(1), Some(2), 10))
        .await
        .unwrap();
    assert_eq!(page.total, 5);
    assert_eq!(page.total_page, 3);
    assert_eq!(page.page, 1);
    let titles: Vec<&str> = page.list.iter().map(|q| q.title.as_str()).collect();
    assert_eq!(titles, vec!["q2", "q1"]);

    let past_end = question_service::list_mine(&env.db, &alice, None, PageRequest::new(Some(7), Some(2), 10))
        .await
        .unwrap();
    assert!(past_end.list.is_empty());
    assert_eq!(past_end.total, 5);
}

#[actix_web::test]
async fn failed_raw_statements_surface_as_server_errors() {
    let env = TestEnv::new().await;
    let err = exec_sql(&env.db, "UPDATE no_such_table SET x = ?", vec![1i32.into()])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Db(_)));
    assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}
