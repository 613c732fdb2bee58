//! Benchmarks for step planning and model execution
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lumass_core::controller::StepScheduler;
use lumass_core::model::{
    BuiltinProcessType, DataObject, ModelComponent, Process, PropertyValue, ROOT_NAME,
};
use lumass_core::{ModelController, ProcessFactory};
use std::sync::Arc;

/// `width` independent source → expression chains under root, plus a
/// buffer taking one expression per fetch.
fn wide_model(width: usize) -> ModelController {
    let mut controller = ModelController::new(Arc::new(ProcessFactory::with_builtins()));
    let mut buffer_inputs = Vec::with_capacity(width);
    for i in 0..width {
        let source = format!("Src{}", i);
        let calc = format!("Calc{}", i);

        let mut process = BuiltinProcessType::ScalarSource.create();
        process.set_parameter("Values", PropertyValue::StringList(vec![i.to_string()]));
        controller
            .add_component(ModelComponent::with_process(source.as_str(), process), None)
            .unwrap();

        let mut process = BuiltinProcessType::MathExpression.create();
        process.set_parameter("Expression", PropertyValue::StringList(vec!["b1 * 2.0".into()]));
        let mut component = ModelComponent::with_process(calc.as_str(), process);
        component.set_inputs(vec![vec![source]]);
        controller.add_component(component, None).unwrap();
        buffer_inputs.push(calc);
    }

    let mut last = ModelComponent::data("Last");
    last.set_data_object(DataObject::scalar(0.0)).unwrap();
    last.set_inputs(buffer_inputs.into_iter().map(|c| vec![c]).collect());
    controller.add_component(last, None).unwrap();
    controller
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_plan");

    for width in [10, 100, 1000].iter() {
        let controller = wide_model(*width);
        let repo = controller.repository();
        group.throughput(Throughput::Elements(repo.len() as u64));
        group.bench_with_input(BenchmarkId::new("plan", width), &repo, |b, repo| {
            b.iter(|| black_box(StepScheduler::plan(repo, repo.root_id(), 0).unwrap()));
        });
    }

    group.finish();
}

fn bench_execute(c: &mut Criterion) {
    let mut group = c.benchmark_group("execute_model");
    group.sample_size(20);

    for width in [10, 100].iter() {
        let mut controller = wide_model(*width);
        group.throughput(Throughput::Elements(*width as u64 * 2));
        group.bench_function(BenchmarkId::new("root", width), |b| {
            b.iter(|| black_box(controller.execute_model(ROOT_NAME).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan, bench_execute);
criterion_main!(benches);
