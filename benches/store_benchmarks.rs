use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use qgraph_rs::*;

// Person/Dog graph where Dog.owner is the to-one side of Person.dogs
fn create_store() -> Result<(Store, EntityType, EntityType)> {
    let mut store = Store::new();
    store.install_namespace(
        "default",
        vec![
            SchemaDef::new("Person")
                .attribute("name")
                .attribute_with_default("score", 0)
                .attribute_with_default("active", true),
            SchemaDef::new("Dog")
                .attribute("name")
                .relationship(RelationshipDef::new("owner", "Person").reverse("dogs")),
            SchemaDef::new("Employee").parent("Person"),
        ],
    )?;
    let person = store.schema_by_name("Person")?;
    let dog = store.schema_by_name("Dog")?;
    Ok((store, person, dog))
}

fn populate(store: &mut Store, person: EntityType, count: usize) -> Result<Vec<EntityId>> {
    (0..count)
        .map(|i| {
            store.instantiate(
                person,
                record! { "id" => i, "name" => format!("Person{}", i), "score" => (i % 100) as i64 },
            )
        })
        .collect()
}

fn bench_entity_creation(c: &mut Criterion) {
    let mut group = c.benchmark_group("entity_creation");

    for batch_size in [1, 10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));

        group.bench_with_input(BenchmarkId::new("instantiate", batch_size), batch_size, |b, &batch_size| {
            b.iter(|| {
                let (mut store, person, _) = create_store().unwrap();
                black_box(populate(&mut store, person, batch_size).unwrap());
            })
        });

        group.bench_with_input(BenchmarkId::new("map", batch_size), batch_size, |b, &batch_size| {
            b.iter(|| {
                let (mut store, person, _) = create_store().unwrap();
                let records = (0..batch_size)
                    .map(|i| record! { "id" => i, "name" => format!("Person{}", i) })
                    .collect();
                black_box(store.map(person, records, MapOptions::default()).unwrap());
            })
        });
    }

    group.finish();
}

fn bench_field_operations(c: &mut Criterion) {
    let mut group = c.benchmark_group("field_operations");

    let (mut store, person, _) = create_store().unwrap();
    let ids = populate(&mut store, person, 100).unwrap();

    for op_count in [1, 10, 100].iter() {
        group.throughput(Throughput::Elements(*op_count as u64));

        group.bench_with_input(BenchmarkId::new("bulk_write", op_count), op_count, |b, &op_count| {
            let mut round = 0i64;
            b.iter(|| {
                round += 1;
                let writes = ids
                    .iter()
                    .take(op_count)
                    .map(|id| (*id, "score".to_string(), Value::Int(round)))
                    .collect();
                black_box(store.write_batch(writes).unwrap());
            })
        });

        group.bench_with_input(BenchmarkId::new("bulk_read", op_count), op_count, |b, &op_count| {
            b.iter(|| {
                for id in ids.iter().take(op_count) {
                    black_box(store.read(*id, "score").unwrap());
                }
            })
        });
    }

    group.finish();
}

fn bench_relationships(c: &mut Criterion) {
    let mut group = c.benchmark_group("relationships");

    for dog_count in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*dog_count as u64));

        group.bench_with_input(BenchmarkId::new("reassign_owner", dog_count), dog_count, |b, &dog_count| {
            let (mut store, person, dog) = create_store().unwrap();
            let owners = populate(&mut store, person, 2).unwrap();
            let dogs: Vec<EntityId> = (0..dog_count)
                .map(|_| store.instantiate(dog, record! {}).unwrap())
                .collect();
            let mut flip = 0;
            b.iter(|| {
                flip ^= 1;
                for d in &dogs {
                    store.set_related(*d, "owner", Some(owners[flip])).unwrap();
                }
                black_box(store.linked(owners[flip], "dogs").unwrap());
            })
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for dataset_size in [100, 1000, 10000].iter() {
        group.throughput(Throughput::Elements(*dataset_size as u64));

        let (mut store, person, _) = create_store().unwrap();
        populate(&mut store, person, *dataset_size).unwrap();

        group.bench_with_input(BenchmarkId::new("scan", dataset_size), dataset_size, |b, _| {
            let query = store.query(person, Predicate::gte("score", 50));
            b.iter(|| black_box(query.execute(&store).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("scan_sorted", dataset_size), dataset_size, |b, _| {
            let query = store.query(person, Predicate::gte("score", 50)).order_by("-score,name");
            b.iter(|| black_box(query.execute(&store).unwrap()))
        });

        group.bench_with_input(BenchmarkId::new("paginated", dataset_size), dataset_size, |b, _| {
            let query = store.query(person, Predicate::All);
            let opts = PageOpts::new(50, Some("50".to_string()));
            b.iter(|| black_box(query.execute_paginated(&store, &opts).unwrap()))
        });
    }

    group.finish();
}

fn bench_live_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("live_query");

    group.bench_function("membership_updates", |b| {
        let (mut store, person, _) = create_store().unwrap();
        let ids = populate(&mut store, person, 1000).unwrap();
        let mut live = LiveQuery::new(store.query(person, Predicate::eq("active", true)).order_by("score"));
        live.init(&mut store).unwrap();

        let mut active = true;
        b.iter(|| {
            active = !active;
            for id in ids.iter().take(100) {
                store.write(*id, "active", active).unwrap();
            }
            black_box(live.len());
        })
    });

    group.bench_function("positional_move", |b| {
        let (mut store, person, _) = create_store().unwrap();
        populate(&mut store, person, 1000).unwrap();
        let mut positional = PositionalQuery::new(store.query(person, Predicate::All), "index");
        positional.init(&mut store).unwrap();

        b.iter(|| {
            positional.move_item(&mut store, 0, 999).unwrap();
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_entity_creation,
    bench_field_operations,
    bench_relationships,
    bench_query,
    bench_live_query
);
criterion_main!(benches);
