use core::hint::black_box;
use core::time::Duration;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rclcore::{
    AnyServiceCallback, Allocator, BoundedResource, Context, ExecutorConfig, LoopbackTransport,
    LoopbackWaitSet, MultiThreadedExecutor, Node, RequestId, ServiceAllocators, ServiceType,
    Shared, reinterpret_owned,
};
use std::{sync::Arc, time::Instant};

#[derive(Clone, Debug, Default)]
struct AddRequest {
    a: i64,
    b: i64,
}

#[derive(Clone, Debug, Default)]
struct AddResponse {
    sum: i64,
}

struct Add;

impl ServiceType for Add {
    type Request = AddRequest;
    type Response = AddResponse;
}

// Handles per benchmark iteration.
const TOTAL_HANDLES: usize = 4096;

// Requests per benchmark iteration.
const TOTAL_REQUESTS: usize = 1024;

/// Allocation and the erase/reinterpret round trip a service performs for
/// every request.
fn bench_allocator(c: &mut Criterion) {
    let mut group = c.benchmark_group("allocator");
    group.throughput(Throughput::Elements(TOTAL_HANDLES as u64));

    let global = Allocator::<AddRequest>::default();
    group.bench_function(format!("global/allocate/elems/{TOTAL_HANDLES}"), |b| {
        b.iter(|| {
            for i in 0..TOTAL_HANDLES as i64 {
                let handle = global.allocate_shared(AddRequest { a: i, b: i }).unwrap();
                black_box(handle);
            }
        });
    });

    let bounded = Allocator::<AddRequest>::from_resource(BoundedResource::new(1 << 20));
    group.bench_function(format!("bounded/allocate/elems/{TOTAL_HANDLES}"), |b| {
        b.iter(|| {
            for i in 0..TOTAL_HANDLES as i64 {
                let handle = bounded.allocate_shared(AddRequest { a: i, b: i }).unwrap();
                black_box(handle);
            }
        });
    });

    let header_alloc = global.rebind::<RequestId>();
    group.bench_function(format!("global/reinterpret/elems/{TOTAL_HANDLES}"), |b| {
        b.iter(|| {
            for i in 0..TOTAL_HANDLES as i64 {
                let handle = header_alloc.allocate_shared(RequestId::new(1, i)).unwrap();
                let erased = Shared::into_erased(handle);
                let typed = reinterpret_owned(erased, &header_alloc).unwrap();
                black_box(typed);
            }
        });
    });

    group.finish();
}

/// Request/response round trips through a loopback service served by the
/// multi-threaded executor.
fn bench_round_trip(c: &mut Criterion, group_name: &str, threads: usize) {
    let mut group = c.benchmark_group(group_name);
    group.throughput(Throughput::Elements(TOTAL_REQUESTS as u64));
    group.sample_size(20);

    let context = Arc::new(Context::new());
    let transport = Arc::new(LoopbackTransport::new());
    let wait_set = Arc::new(
        LoopbackWaitSet::new(transport.clone(), &context)
            .with_poll_interval(Duration::from_millis(5)),
    );
    let node = Node::new("bench", transport, wait_set.clone());
    let allocators = ServiceAllocators::from_allocator(&Allocator::<()>::from_resource(
        BoundedResource::new(1 << 24),
    ));
    let _service = node
        .create_service::<Add>(
            "add",
            AnyServiceCallback::new(|req: Shared<AddRequest>, resp: &mut AddResponse| {
                resp.sum = req.a + req.b;
            }),
            Some(allocators),
        )
        .unwrap();
    let client = node.create_client::<Add>("add", None).unwrap();

    let executor = MultiThreadedExecutor::with_config(
        context.clone(),
        wait_set,
        ExecutorConfig::with_threads(threads),
    )
    .unwrap();

    std::thread::scope(|s| {
        let spinner = s.spawn(|| executor.spin());

        group.bench_function(format!("elems/{TOTAL_REQUESTS}"), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    let futures: Vec<_> = (0..TOTAL_REQUESTS as i64)
                        .map(|i| client.async_send_request(&AddRequest { a: i, b: 1 }).unwrap())
                        .collect();
                    for future in futures {
                        black_box(future.wait().unwrap().sum);
                    }
                }
                start.elapsed()
            });
        });

        context.shutdown();
        spinner.join().unwrap().unwrap();
    });

    group.finish();
}

fn benches(c: &mut Criterion) {
    bench_allocator(c);

    for threads in [1, 2, 4] {
        bench_round_trip(c, &format!("loopback/add/threads/{threads}"), threads);
    }
}

criterion_group!(all, benches);
criterion_main!(all);
