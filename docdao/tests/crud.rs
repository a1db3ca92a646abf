mod common;

use std::time::Duration;

use common::Account;
use docdao::{
    bson::{Bson, doc},
    memory::{InMemoryCollection, InMemoryStore},
    prelude::*,
};

async fn accounts() -> (InMemoryStore, CrudDao<Account, InMemoryCollection>) {
    let store = InMemoryStore::new();
    let dao = store.dao::<Account>(DecodeConfig::new(4)).await;
    dao.ensure_indexes(&Context::background()).await;

    (store, dao)
}

async fn seed(dao: &CrudDao<Account, InMemoryCollection>, people: &[(&str, &str)]) {
    let ctx = Context::background();

    for (email, name) in people {
        assert!(dao.create(&ctx, &mut Account::new(email, name)).await.unwrap());
    }
}

#[tokio::test]
async fn test_create_reports_unique_conflicts_as_false() {
    let (_, dao) = accounts().await;
    let ctx = Context::background();

    let mut first = Account::new("ada@example.com", "Ada");
    assert!(dao.create(&ctx, &mut first).await.unwrap());
    assert!(first.created_at.is_some());

    let mut duplicate = Account::new("ada@example.com", "Impostor");
    assert!(!dao.create(&ctx, &mut duplicate).await.unwrap());

    assert_eq!(dao.count(&ctx, doc! {}).await.unwrap(), 1);
}

#[tokio::test]
async fn test_update_outcomes() {
    let (_, dao) = accounts().await;
    let ctx = Context::background();
    seed(&dao, &[("ada@example.com", "Ada"), ("grace@example.com", "Grace")]).await;

    let missing = dao
        .update(&ctx, doc! { "email": "alan@example.com" }, doc! { "$set": { "name": "Alan" } }, false)
        .await
        .unwrap();
    assert_eq!(missing, UpdateOutcome::NotFound);
    assert_eq!(dao.count(&ctx, doc! {}).await.unwrap(), 2);

    let upserted = dao
        .update(&ctx, doc! { "email": "alan@example.com" }, doc! { "$set": { "name": "Alan" } }, true)
        .await
        .unwrap();
    assert_eq!(upserted, UpdateOutcome::Modified { inserted: true });
    assert_eq!(dao.count(&ctx, doc! {}).await.unwrap(), 3);

    let modified = dao
        .update(&ctx, doc! { "email": "ada@example.com" }, doc! { "$inc": { "logins": 1 } }, false)
        .await
        .unwrap();
    assert_eq!(modified, UpdateOutcome::Modified { inserted: false });

    let conflict = dao
        .update(
            &ctx,
            doc! { "email": "grace@example.com" },
            doc! { "$set": { "email": "ada@example.com" } },
            false,
        )
        .await
        .unwrap();
    assert_eq!(conflict, UpdateOutcome::UniqueConflict);

    let alan = dao
        .find_one(&ctx, doc! { "email": "alan@example.com" }, FindOneOptions::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alan.name, "Alan");
    assert!(alan.updated_at.is_some());
}

#[tokio::test]
async fn test_update_stamps_modification_time() {
    let (_, dao) = accounts().await;
    let ctx = Context::background();
    seed(&dao, &[("ada@example.com", "Ada")]).await;

    let before = dao
        .find_one(&ctx, doc! { "email": "ada@example.com" }, FindOneOptions::default())
        .await
        .unwrap()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    dao.update(&ctx, doc! { "email": "ada@example.com" }, doc! { "$set": { "name": "Ada L." } }, false)
        .await
        .unwrap();

    let after = dao
        .find_one(&ctx, doc! { "email": "ada@example.com" }, FindOneOptions::default())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(after.name, "Ada L.");
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at > before.updated_at);
}

#[tokio::test]
async fn test_find_one_and_exists() {
    let (_, dao) = accounts().await;
    let ctx = Context::background();
    seed(&dao, &[("ada@example.com", "Ada"), ("grace@example.com", "Grace")]).await;

    let nobody = dao
        .find_one(&ctx, doc! { "email": "nobody@example.com" }, FindOneOptions::default())
        .await
        .unwrap();
    assert!(nobody.is_none());

    let last = dao
        .find_one(&ctx, doc! {}, FindOneOptions::default().sort(doc! { "email": -1 }))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.name, "Grace");
    assert!(last.id.is_some());

    assert!(dao.exists(&ctx, doc! { "name": "Ada" }, CountOptions::default()).await.unwrap());
    assert!(!dao.exists(&ctx, doc! { "name": "Alan" }, CountOptions::default()).await.unwrap());
    assert_eq!(dao.count(&ctx, doc! { "name": { "$in": ["Ada", "Grace"] } }).await.unwrap(), 2);
}

#[tokio::test]
async fn test_find_many_keeps_store_order() {
    let (store, dao) = accounts().await;
    let ctx = Context::background();

    let people = (0..40)
        .map(|n| (format!("user{n:02}@example.com"), format!("User {n:02}")))
        .collect::<Vec<_>>();
    for (email, name) in &people {
        assert!(dao.create(&ctx, &mut Account::new(email, name)).await.unwrap());
    }

    let all = dao.find_many(&ctx, doc! {}, FindOptions::default()).await.unwrap();
    let emails = all.iter().map(|a| a.email.clone()).collect::<Vec<_>>();
    assert_eq!(emails, people.iter().map(|(email, _)| email.clone()).collect::<Vec<_>>());

    let page = dao
        .find_many(
            &ctx,
            doc! {},
            FindOptions::default().sort(doc! { "name": -1 }).skip(2).limit(3),
        )
        .await
        .unwrap();
    let names = page.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["User 37", "User 36", "User 35"]);

    let none = dao
        .find_many(&ctx, doc! { "name": "nobody" }, FindOptions::default())
        .await
        .unwrap();
    assert!(none.is_empty());

    assert_eq!(store.open_cursors(), 0);
}

#[tokio::test]
async fn test_decode_failure_fails_the_whole_read() {
    let (store, dao) = accounts().await;
    let ctx = Context::background();
    seed(&dao, &[("ada@example.com", "Ada"), ("grace@example.com", "Grace")]).await;

    dao.collection()
        .insert_one(doc! { "email": "broken@example.com", "name": Bson::Int32(7) })
        .await
        .unwrap();

    let err = dao.find_many(&ctx, doc! {}, FindOptions::default()).await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Decode(_)));
    assert!(err.to_string().contains("account"));
    assert_eq!(store.open_cursors(), 0);

    let err = dao
        .find_one(&ctx, doc! { "email": "broken@example.com" }, FindOneOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, DocumentStoreError::Decode(_)));
}

#[tokio::test]
async fn test_aggregate_decodes_pipeline_output() {
    let (_, dao) = accounts().await;
    let ctx = Context::background();
    seed(
        &dao,
        &[("ada@example.com", "Ada"), ("grace@example.com", "Grace"), ("alan@example.com", "Alan")],
    )
    .await;

    let pipeline = vec![
        doc! { "$match": { "name": { "$ne": "Grace" } } },
        doc! { "$sort": { "name": 1 } },
    ];
    let result = dao.aggregate(&ctx, pipeline).await.unwrap();

    let names = result.iter().map(|a| a.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Ada", "Alan"]);

    assert!(dao.aggregate(&ctx, vec![doc! { "$unwind": "$name" }]).await.is_err());
}

#[tokio::test]
async fn test_deletes() {
    let (_, dao) = accounts().await;
    let ctx = Context::background();
    seed(
        &dao,
        &[("ada@example.com", "Ada"), ("grace@example.com", "Grace"), ("alan@example.com", "Alan")],
    )
    .await;

    assert!(!dao.delete(&ctx, doc! { "email": "nobody@example.com" }).await.unwrap());
    assert!(dao.delete(&ctx, doc! { "email": "ada@example.com" }).await.unwrap());
    assert!(dao.delete_many(&ctx, doc! { "name": { "$regex": "^A" } }).await.is_err());
    assert_eq!(dao.delete_many(&ctx, doc! {}).await.unwrap(), 2);
    assert_eq!(dao.count(&ctx, doc! {}).await.unwrap(), 0);
}

#[tokio::test]
async fn test_interrupted_context_stops_operations() {
    let (_, dao) = accounts().await;

    let ctx = Context::background();
    ctx.cancel();

    let err = dao.create(&ctx, &mut Account::new("ada@example.com", "Ada")).await.unwrap_err();
    assert_eq!(err, DocumentStoreError::Cancelled);
    assert_eq!(dao.count(&Context::background(), doc! {}).await.unwrap(), 0);

    let expired = Context::background().with_timeout(Duration::ZERO);
    let err = dao.find_many(&expired, doc! {}, FindOptions::default()).await.unwrap_err();
    assert!(err.is_interrupted());
}

#[tokio::test]
async fn test_indexes_are_built_in_the_background() {
    let store = InMemoryStore::new();
    let _dao = store.dao::<Account>(DecodeConfig::default()).await;
    let collection = store.collection("accounts").await;

    for _ in 0..100 {
        if !collection.index_names().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert_eq!(collection.index_names().await, vec!["email_1".to_string()]);
}
