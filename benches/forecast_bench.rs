use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::{rngs::StdRng, SeedableRng};
use weather_api::{
    logging::{Enrichers, TemplateFormatter},
    routes::weather::generate_forecasts,
};

fn forecast_generation_benchmark(c: &mut Criterion) {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
    let mut rng = StdRng::seed_from_u64(11);

    c.bench_function("forecast_generation", |b| {
        b.iter(|| black_box(generate_forecasts(today, &mut rng)))
    });
}

fn forecast_serialization_benchmark(c: &mut Criterion) {
    let today = chrono::NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
    let forecasts = generate_forecasts(today, &mut StdRng::seed_from_u64(11));

    c.bench_function("forecast_serialization", |b| {
        b.iter(|| black_box(serde_json::to_string(&forecasts).unwrap()))
    });
}

fn template_formatting_benchmark(c: &mut Criterion) {
    use tracing_subscriber::layer::SubscriberExt;

    let subscriber = tracing_subscriber::registry().with(
        tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .event_format(TemplateFormatter::new(
                Enrichers::new().with_machine_name().with_assembly(),
            ))
            .with_writer(std::io::sink),
    );

    tracing::subscriber::with_default(subscriber, || {
        c.bench_function("template_formatting", |b| {
            b.iter(|| tracing::info!(RequestPath = "/weatherforecast", StatusCode = 200, "request"))
        });
    });
}

criterion_group!(
    benches,
    forecast_generation_benchmark,
    forecast_serialization_benchmark,
    template_formatting_benchmark
);
criterion_main!(benches);
