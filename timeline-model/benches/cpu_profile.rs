use chrome_trace_format::{CallFrame, Profile, ProfileNode};
use divan::Bencher;
use std::hint::black_box;
use timeline_model::cpu_profile::{CpuProfileModel, CpuProfileNode, FrameVisitor};

#[global_allocator]
static ALLOC: divan::AllocProfiler = divan::AllocProfiler::system();

/// A chain of `depth` functions sampled so that the stack grows and shrinks
/// in a saw-tooth.
fn create_profile(depth: u32, num_samples: usize) -> Profile {
    let nodes = (1..=depth + 1)
        .map(|id| {
            let name = if id == 1 { "(root)".to_string() } else { format!("fn_{}", id) };
            let call_frame = CallFrame::builder()
                .function_name(name)
                .script_id("1")
                .url("bench.js")
                .line_number(i64::from(id))
                .column_number(0)
                .build();
            ProfileNode::builder()
                .id(id)
                .call_frame(call_frame)
                .maybe_parent((id > 1).then(|| id - 1))
                .build()
        })
        .collect();
    let period = depth as usize * 2;
    let samples = (0..num_samples)
        .map(|i| {
            let phase = i % period;
            let level = if phase < depth as usize { phase } else { period - phase - 1 };
            level as u32 + 2
        })
        .collect();
    Profile::builder()
        .start_time(0.0)
        .end_time(num_samples as f64 * 100.0)
        .nodes(nodes)
        .samples(samples)
        .time_deltas(vec![100.0; num_samples])
        .build()
}

#[derive(Default)]
struct FrameCounter {
    opened: usize,
    closed: usize,
}

impl FrameVisitor for FrameCounter {
    fn open_frame(&mut self, _depth: i32, _node: &CpuProfileNode, _start_time: f64) {
        self.opened += 1;
    }

    fn close_frame(
        &mut self,
        _depth: i32,
        _node: &CpuProfileNode,
        _start_time: f64,
        _duration: f64,
        _self_time: f64,
    ) {
        self.closed += 1;
    }
}

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn reconstruct(bencher: Bencher, num_samples: usize) {
    let profile = create_profile(16, num_samples);
    bencher
        .with_inputs(|| profile.clone())
        .bench_values(|profile| black_box(CpuProfileModel::new(profile).unwrap()));
}

#[divan::bench(args = [1_000, 10_000, 100_000])]
fn walk_frames(bencher: Bencher, num_samples: usize) {
    let model = CpuProfileModel::new(create_profile(16, num_samples)).unwrap();
    bencher.bench_local(|| {
        let mut counter = FrameCounter::default();
        model.for_each_frame(&mut counter, None, None);
        black_box((counter.opened, counter.closed));
    });
}

fn main() {
    divan::main();
}
