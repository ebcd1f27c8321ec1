use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use rand::SeedableRng;
use rand::rngs::SmallRng;
use stormvogel_core::bird::Bird;
use stormvogel_core::pgc::ProgramGraphBuilder;
use stormvogel_core::simulator::simulate_path;
use stormvogel_core::*;

#[inline(always)]
fn chain(len: u32) -> Bird<'static, u32> {
    Bird::new(ModelType::Dtmc, 0u32).delta(move |s| {
        (*s < len).then(|| vec![(Value::ratio(1, 2), s + 1), (Value::ratio(1, 2), 0)])
    })
}

#[inline(always)]
fn grid(size: i64) -> Bird<'static, (i64, i64)> {
    Bird::new(ModelType::Mdp, (0i64, 0i64))
        .available_actions(|_| {
            ["north", "south", "east", "west"]
                .into_iter()
                .map(|dir| vec![String::from(dir)])
                .collect()
        })
        .action_delta(move |(x, y), action| {
            let (nx, ny) = match action[0].as_str() {
                "north" => (*x, (y + 1).min(size - 1)),
                "south" => (*x, (y - 1).max(0)),
                "east" => ((x + 1).min(size - 1), *y),
                _ => ((x - 1).max(0), *y),
            };
            Some(vec![(Value::ratio(9, 10), (nx, ny)), (Value::ratio(1, 10), (*x, *y))])
        })
        .max_size((size * size) as usize)
}

#[inline(always)]
fn counter_pg(max: i64) -> ProgramGraphBuilder {
    let mut pg = ProgramGraphBuilder::new();
    let x = pg.new_var("x", Val::Integer(0)).unwrap();
    let loc = pg.new_location("loc").unwrap();
    let inc = pg.new_action(["inc"]);
    pg.add_effect(inc, x, |vars| match vars[0] {
        Val::Integer(n) => Val::Integer(n + 1),
        val => val,
    })
    .unwrap();
    pg.add_transition(
        loc,
        inc,
        loc,
        Some(Box::new(move |vars: &[Val]| vars[0] != Val::Integer(max))),
    )
    .unwrap();
    pg
}

fn build(c: &mut Criterion) {
    for len in [100, 1000] {
        let bird = chain(len);
        c.bench_with_input(BenchmarkId::new("build chain", len), &bird, |b, bird| {
            b.iter(|| bird.build().unwrap());
        });
    }
    for size in [10, 50] {
        let bird = grid(size);
        c.bench_with_input(BenchmarkId::new("build grid", size), &bird, |b, bird| {
            b.iter(|| bird.build().unwrap());
        });
    }
    let pg = counter_pg(1000);
    c.bench_with_input(BenchmarkId::new("unfold pg", 1000), &pg, |b, pg| {
        b.iter(|| pg.build(ModelType::Mdp).unwrap());
    });
}

fn simulate(c: &mut Criterion) {
    let model = grid(50).build().unwrap();
    c.bench_with_input(
        BenchmarkId::new("simulate path", "grid 50"),
        &model,
        |b, model| {
            let mut rng = SmallRng::from_seed([0; 32]);
            b.iter(|| simulate_path(model, 1000, None, &mut rng).unwrap());
        },
    );
}

criterion_group!(benches, build, simulate);
criterion_main!(benches);
