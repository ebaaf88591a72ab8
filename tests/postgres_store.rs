//! `PgStore` against a freshly migrated database per test.

use buscacursos::data::models::{
    CourseRecord, CourseWrite, Day, NewSubject, Period, ScheduleSlot, TeacherChanges,
};
use buscacursos::data::{CourseStore, PgStore};
use sqlx::PgPool;

/// Term, subject and campus rows for one course, returned as its scalar columns.
async fn seed_record(store: &PgStore) -> CourseRecord {
    let term = store.create_term(2024, Period::S1).await.unwrap();
    let subject_id = store
        .upsert_subject(&NewSubject {
            code: "IIC2233".to_owned(),
            name: "Programación Avanzada".to_owned(),
            credits: 10,
            ..NewSubject::default()
        })
        .await
        .unwrap();
    let campus_id = store.get_or_create_campus("San Joaquín").await.unwrap();

    CourseRecord {
        term_id: term.id,
        subject_id,
        campus_id,
        section: 1,
        nrc: "12345".to_owned(),
        format: "Presencial".to_owned(),
        category: "Mínimo".to_owned(),
        fg_area: String::new(),
        is_removable: true,
        is_english: false,
        need_special_approval: false,
        total_quota: 60,
        available_quota: 12,
        schedule_summary: "L1:CLAS:B12".to_owned(),
    }
}

fn slot(day: Day, module: i16, kind: &str, classroom: &str) -> ScheduleSlot {
    ScheduleSlot {
        day,
        module,
        classroom: classroom.to_owned(),
        kind: kind.to_owned(),
    }
}

fn roster(ids: &[i32]) -> TeacherChanges {
    TeacherChanges {
        detached: Vec::new(),
        attached: ids.to_vec(),
        roster: ids.to_vec(),
    }
}

async fn slot_rows(pool: &PgPool, course_id: i32) -> Vec<(i32, String, i16)> {
    sqlx::query_as::<_, (i32, String, i16)>(
        "SELECT id, day, module FROM class_schedules WHERE course_id = $1 ORDER BY id",
    )
    .bind(course_id)
    .fetch_all(pool)
    .await
    .unwrap()
}

async fn teacher_names(store: &PgStore, record: &CourseRecord) -> Vec<String> {
    store
        .find_course(record.term_id, "IIC2233", record.section)
        .await
        .unwrap()
        .unwrap()
        .teachers
        .into_iter()
        .map(|t| t.name)
        .collect()
}

#[sqlx::test]
async fn test_get_or_create_is_idempotent(pool: PgPool) {
    let store = PgStore::new(pool.clone());

    let first = store.get_or_create_teacher("Ana Pérez").await.unwrap();
    let second = store.get_or_create_teacher("Ana Pérez").await.unwrap();
    let other = store.get_or_create_teacher("Bruno Díaz").await.unwrap();
    assert_eq!(first, second);
    assert_ne!(first, other);

    let campus = store.get_or_create_campus("San Joaquín").await.unwrap();
    assert_eq!(store.get_or_create_campus("San Joaquín").await.unwrap(), campus);

    let term = store.create_term(2024, Period::Tav).await.unwrap();
    assert_eq!(store.create_term(2024, Period::Tav).await.unwrap(), term);
    assert_eq!(store.find_term(2024, Period::Tav).await.unwrap(), Some(term));

    let teachers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM teachers")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(teachers, 2);
}

#[sqlx::test]
async fn test_save_course_upserts_on_section_key(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let record = seed_record(&store).await;

    let write = CourseWrite {
        record: record.clone(),
        teachers: TeacherChanges::default(),
        schedule: None,
    };
    let id = store.save_course(&write).await.unwrap();

    let mut changed = write.clone();
    changed.record.available_quota = 3;
    assert_eq!(store.save_course(&changed).await.unwrap(), id);

    let (count, quota): (i64, i32) =
        sqlx::query_as("SELECT COUNT(*), MAX(available_quota) FROM courses")
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!((count, quota), (1, 3));
}

#[sqlx::test]
async fn test_teacher_set_converges(pool: PgPool) {
    let store = PgStore::new(pool);
    let record = seed_record(&store).await;
    let a = store.get_or_create_teacher("Ana Pérez").await.unwrap();
    let b = store.get_or_create_teacher("Bruno Díaz").await.unwrap();
    let c = store.get_or_create_teacher("Carla Soto").await.unwrap();

    store
        .save_course(&CourseWrite {
            record: record.clone(),
            teachers: roster(&[a, b]),
            schedule: None,
        })
        .await
        .unwrap();
    assert_eq!(teacher_names(&store, &record).await, vec!["Ana Pérez", "Bruno Díaz"]);

    store
        .save_course(&CourseWrite {
            record: record.clone(),
            teachers: TeacherChanges {
                detached: vec![a],
                attached: vec![c],
                roster: vec![b, c],
            },
            schedule: None,
        })
        .await
        .unwrap();
    assert_eq!(teacher_names(&store, &record).await, vec!["Bruno Díaz", "Carla Soto"]);

    // A reordered listing renumbers the kept teachers.
    store
        .save_course(&CourseWrite {
            record: record.clone(),
            teachers: TeacherChanges {
                roster: vec![c, b],
                ..TeacherChanges::default()
            },
            schedule: None,
        })
        .await
        .unwrap();
    assert_eq!(teacher_names(&store, &record).await, vec!["Carla Soto", "Bruno Díaz"]);
}

#[sqlx::test]
async fn test_schedule_is_replaced_as_a_whole(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let record = seed_record(&store).await;

    let id = store
        .save_course(&CourseWrite {
            record: record.clone(),
            teachers: TeacherChanges::default(),
            schedule: Some(vec![
                slot(Day::Monday, 1, "CLAS", "B12"),
                slot(Day::Wednesday, 1, "CLAS", "B12"),
            ]),
        })
        .await
        .unwrap();
    let before = slot_rows(&pool, id).await;
    assert_eq!(before.len(), 2);

    let mut moved = record.clone();
    moved.schedule_summary = "J3:AYU:K201".to_owned();
    store
        .save_course(&CourseWrite {
            record: moved,
            teachers: TeacherChanges::default(),
            schedule: Some(vec![slot(Day::Thursday, 3, "AYU", "K201")]),
        })
        .await
        .unwrap();

    let after = slot_rows(&pool, id).await;
    assert_eq!(after.len(), 1);
    assert_eq!((after[0].1.as_str(), after[0].2), ("J", 3));
    assert!(before.iter().all(|(old, ..)| *old != after[0].0));
}

#[sqlx::test]
async fn test_unchanged_schedule_is_left_alone(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let record = seed_record(&store).await;

    let id = store
        .save_course(&CourseWrite {
            record: record.clone(),
            teachers: TeacherChanges::default(),
            schedule: Some(vec![slot(Day::Monday, 1, "CLAS", "B12")]),
        })
        .await
        .unwrap();
    let before = slot_rows(&pool, id).await;

    store
        .save_course(&CourseWrite {
            record,
            teachers: TeacherChanges::default(),
            schedule: None,
        })
        .await
        .unwrap();

    assert_eq!(slot_rows(&pool, id).await, before);
}

#[sqlx::test]
async fn test_failed_write_rolls_back(pool: PgPool) {
    let store = PgStore::new(pool.clone());
    let record = seed_record(&store).await;
    let a = store.get_or_create_teacher("Ana Pérez").await.unwrap();
    let b = store.get_or_create_teacher("Bruno Díaz").await.unwrap();

    let id = store
        .save_course(&CourseWrite {
            record: record.clone(),
            teachers: roster(&[a]),
            schedule: Some(vec![slot(Day::Monday, 1, "CLAS", "B12")]),
        })
        .await
        .unwrap();
    let before = slot_rows(&pool, id).await;

    // Module 9 violates the schedule check after the other statements ran.
    let mut changed = record.clone();
    changed.available_quota = 0;
    let result = store
        .save_course(&CourseWrite {
            record: changed,
            teachers: TeacherChanges {
                detached: vec![a],
                attached: vec![b],
                roster: vec![b],
            },
            schedule: Some(vec![slot(Day::Friday, 9, "CLAS", "B12")]),
        })
        .await;
    assert!(result.is_err());

    assert_eq!(teacher_names(&store, &record).await, vec!["Ana Pérez"]);
    assert_eq!(slot_rows(&pool, id).await, before);
    let quota: i32 = sqlx::query_scalar("SELECT available_quota FROM courses WHERE id = $1")
        .bind(id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(quota, 12);
}
