//! This bench loads a document of a few hundred requests, marks one processed
//! and saves it back, the cycle behind every admin update.

#![allow(missing_docs)]

use chrono::Utc;
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use intake::{
    Store,
    domain::{Collection, Identity, Request, RequestUpdate, Status, Submission},
};
use tempfile::TempDir;
use uuid::Uuid;

/// Writes a document holding `count` requests
fn preseed_store(store: &Store, count: usize) {
    let mut collection = Collection::default();
    for i in 0..count {
        let submission = Submission {
            identity: Identity {
                nom: format!("Nom{i}"),
                prenom: "Jean".to_string(),
                telephone: "0102030405".to_string(),
                mail: format!("demandeur{i}@example.com"),
            },
            motif: "Stage".to_string(),
            details: "Stage de trois mois au service comptabilité".to_string(),
        };
        collection.insert(Request::new(
            Uuid::new_v4(),
            submission,
            Utc::now().fixed_offset(),
        ));
    }
    collection.take_events();
    store.save(&mut collection).unwrap();
}

fn load_update_save(c: &mut Criterion) {
    c.bench_function("load update save", |b| {
        b.iter_batched(
            || {
                let tmp_dir = TempDir::new().unwrap();
                let store = Store::new(tmp_dir.path().join("data.json"), chrono_tz::Europe::Paris);
                preseed_store(&store, 500);
                (tmp_dir, store)
            },
            |(_tmp_dir, store)| {
                let mut collection = store.load().unwrap();
                let id = collection.requests()[250].id;
                let update = RequestUpdate {
                    status: Some(Status::Processed),
                    ..RequestUpdate::default()
                };
                collection.apply_update(id, update, Vec::new());
                store.save(&mut collection).unwrap();
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, load_update_save);
criterion_main!(benches);
