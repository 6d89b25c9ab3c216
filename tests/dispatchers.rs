//! Dispatcher semantics: priority quotas, strict ordering, pool
//! serialization, per-agent threads, thread-safe handler scheduling.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::ThreadId;
use std::time::Duration;

use parking_lot::Mutex;

use agentry::prelude::*;

struct ReceiverStarted;
impl Signal for ReceiverStarted {}

struct SendBatch;
impl Signal for SendBatch {}

struct Request;
impl Signal for Request {}

#[derive(Debug)]
struct Reply(usize);

/// Quoted round robin: with quotas {p7:5, p5:4, p3:3} and 20 pending
/// demands per priority, the dequeue order follows the literal quota
/// sequence.
#[test]
fn quoted_round_robin_quotas() {
    struct Receiver {
        common: MboxRef,
        priority: usize,
    }

    impl Agent for Receiver {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let common = Arc::clone(&self.common);
            let reply_to = Arc::clone(&self.common);
            let priority = self.priority;
            ctx.so_subscribe(&common)
                .event_signal::<Request, _, _, _>(move |_this: &mut Receiver| {
                    let _ = send(&reply_to, Reply(priority));
                })?;
            Ok(())
        }

        fn so_evt_start(&mut self, _ctx: &mut AgentContext<'_>) -> AgentResult {
            send_signal::<ReceiverStarted>(&self.common)?;
            Ok(())
        }
    }

    struct Sender {
        common: MboxRef,
    }

    impl Agent for Sender {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let common = Arc::clone(&self.common);
            let target = Arc::clone(&self.common);
            ctx.so_subscribe(&common)
                .event_signal::<SendBatch, _, _, _>(move |_this: &mut Sender| {
                    for _ in 0..20 {
                        let _ = send_signal::<Request>(&target);
                    }
                })?;
            Ok(())
        }
    }

    struct Supervisor {
        common: MboxRef,
        started: usize,
        replies: usize,
        accumulator: Arc<Mutex<String>>,
    }

    impl Agent for Supervisor {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let common = Arc::clone(&self.common);
            ctx.so_subscribe(&common)
                .event_signal_ctx::<ReceiverStarted, _, _, _>(
                    |this: &mut Supervisor, _ctx| {
                        this.started += 1;
                        if this.started == 3 {
                            let _ = send_signal::<SendBatch>(&this.common);
                        }
                    },
                )?;
            ctx.so_subscribe(&common)
                .event_ctx(|this: &mut Supervisor, ctx, reply: &Reply| {
                    this.accumulator.lock().push_str(&reply.0.to_string());
                    this.replies += 1;
                    if this.replies == 60 {
                        ctx.so_deregister_agent_coop_normally();
                    }
                })?;
            Ok(())
        }
    }

    let accumulator: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&accumulator);

    Environment::launch(move |env| {
        let common = env.create_mbox();
        let quotes = Quotes::new(2)
            .set(Priority::P7, 5)
            .set(Priority::P5, 4)
            .set(Priority::P3, 3);
        let rr =
            QuotedRoundRobinDispatcher::new(env, "rr", quotes, DispatcherParams::default());

        let mut coop = env.make_coop();
        coop.add_agent(Supervisor {
            common: Arc::clone(&common),
            started: 0,
            replies: 0,
            accumulator,
        });
        coop.add_agent_with_binder(
            Sender {
                common: Arc::clone(&common),
            },
            rr.binder(),
        );
        for priority in [Priority::P7, Priority::P5, Priority::P3] {
            coop.add_agent_full(
                Receiver {
                    common: Arc::clone(&common),
                    priority: priority.as_index(),
                },
                AgentOptions::new().priority(priority),
                Some(rr.binder()),
            );
        }
        env.register_coop(coop)?;
        Ok(())
    })
    .unwrap();

    let expected = format!(
        "{}{}{}{}",
        "777775555333".repeat(4),
        "5555333",
        "333",
        "33"
    );
    assert_eq!(observed.lock().as_str(), expected);
}

/// Strictly ordered: whenever demands of several priorities are pending,
/// the higher priority is always served first.
#[test]
fn strictly_ordered_priorities() {
    struct Receiver {
        common: MboxRef,
        priority: usize,
    }

    impl Agent for Receiver {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let common = Arc::clone(&self.common);
            let reply_to = Arc::clone(&self.common);
            let priority = self.priority;
            ctx.so_subscribe(&common)
                .event_signal::<Request, _, _, _>(move |_this: &mut Receiver| {
                    let _ = send(&reply_to, Reply(priority));
                })?;
            Ok(())
        }

        fn so_evt_start(&mut self, _ctx: &mut AgentContext<'_>) -> AgentResult {
            send_signal::<ReceiverStarted>(&self.common)?;
            Ok(())
        }
    }

    struct Sender {
        common: MboxRef,
    }

    impl Agent for Sender {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let common = Arc::clone(&self.common);
            let target = Arc::clone(&self.common);
            ctx.so_subscribe(&common)
                .event_signal::<SendBatch, _, _, _>(move |_this: &mut Sender| {
                    for _ in 0..5 {
                        let _ = send_signal::<Request>(&target);
                    }
                })?;
            Ok(())
        }
    }

    struct Supervisor {
        common: MboxRef,
        started: usize,
        replies: usize,
        accumulator: Arc<Mutex<String>>,
    }

    impl Agent for Supervisor {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let common = Arc::clone(&self.common);
            ctx.so_subscribe(&common)
                .event_signal_ctx::<ReceiverStarted, _, _, _>(
                    |this: &mut Supervisor, _ctx| {
                        this.started += 1;
                        if this.started == 3 {
                            let _ = send_signal::<SendBatch>(&this.common);
                        }
                    },
                )?;
            ctx.so_subscribe(&common)
                .event_ctx(|this: &mut Supervisor, ctx, reply: &Reply| {
                    this.accumulator.lock().push_str(&reply.0.to_string());
                    this.replies += 1;
                    if this.replies == 15 {
                        ctx.so_deregister_agent_coop_normally();
                    }
                })?;
            Ok(())
        }
    }

    let accumulator: Arc<Mutex<String>> = Arc::new(Mutex::new(String::new()));
    let observed = Arc::clone(&accumulator);

    Environment::launch(move |env| {
        let common = env.create_mbox();
        let strict =
            StrictlyOrderedDispatcher::new(env, "strict", DispatcherParams::default());

        let mut coop = env.make_coop();
        coop.add_agent(Supervisor {
            common: Arc::clone(&common),
            started: 0,
            replies: 0,
            accumulator,
        });
        coop.add_agent_with_binder(
            Sender {
                common: Arc::clone(&common),
            },
            strict.binder(),
        );
        for priority in [Priority::P5, Priority::P3, Priority::P1] {
            coop.add_agent_full(
                Receiver {
                    common: Arc::clone(&common),
                    priority: priority.as_index(),
                },
                AgentOptions::new().priority(priority),
                Some(strict.binder()),
            );
        }
        env.register_coop(coop)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.lock().as_str(), "555553333311111");
}

/// Thread-pool cooperation FIFO: agents of the same coop never run
/// concurrently with each other.
#[test]
fn thread_pool_cooperation_fifo_serializes() {
    #[derive(Debug)]
    struct Work;

    struct Done;
    impl Signal for Done {}

    struct Worker {
        mbox: MboxRef,
        active: Arc<AtomicUsize>,
        violations: Arc<AtomicUsize>,
        processed: Arc<AtomicUsize>,
    }

    impl Agent for Worker {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            ctx.so_subscribe(&mbox)
                .event(|this: &mut Worker, _work: &Work| {
                    if this.active.fetch_add(1, Ordering::SeqCst) != 0 {
                        this.violations.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(2));
                    this.active.fetch_sub(1, Ordering::SeqCst);
                    this.processed.fetch_add(1, Ordering::SeqCst);
                })?;
            ctx.so_subscribe(&mbox)
                .event_signal_ctx::<Done, _, _, _>(|_this: &mut Worker, ctx| {
                    ctx.so_deregister_agent_coop_normally();
                })?;
            Ok(())
        }
    }

    let active = Arc::new(AtomicUsize::new(0));
    let violations = Arc::new(AtomicUsize::new(0));
    let processed = Arc::new(AtomicUsize::new(0));
    let observed_violations = Arc::clone(&violations);
    let observed_processed = Arc::clone(&processed);

    Environment::launch(move |env| {
        let pool = ThreadPoolDispatcher::new(
            env,
            "pool",
            ThreadPoolParams::new()
                .threads(4)
                .fifo(PoolFifo::Cooperation),
        );
        let mbox = env.create_mbox();

        let mut coop = env.make_coop_with_binder(pool.binder());
        for _ in 0..2 {
            coop.add_agent(Worker {
                mbox: Arc::clone(&mbox),
                active: Arc::clone(&active),
                violations: Arc::clone(&violations),
                processed: Arc::clone(&processed),
            });
        }
        env.register_coop(coop)?;

        for _ in 0..10 {
            send(&mbox, Work)?;
        }
        send_signal::<Done>(&mbox)?;
        Ok(())
    })
    .unwrap();

    // Every Work fanned out to both workers.
    assert_eq!(observed_processed.load(Ordering::SeqCst), 20);
    assert_eq!(observed_violations.load(Ordering::SeqCst), 0);
}

/// active_obj gives each agent its own dedicated worker thread.
#[test]
fn active_obj_one_thread_per_agent() {
    #[derive(Debug)]
    struct Ping;

    struct ThreadReporter {
        mbox: MboxRef,
        seen: Arc<Mutex<Vec<ThreadId>>>,
        remaining: Arc<AtomicUsize>,
    }

    impl Agent for ThreadReporter {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            ctx.so_subscribe(&mbox)
                .event_ctx(|this: &mut ThreadReporter, ctx, _ping: &Ping| {
                    this.seen.lock().push(std::thread::current().id());
                    if this.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                        ctx.so_deregister_agent_coop_normally();
                    }
                })?;
            Ok(())
        }
    }

    let seen: Arc<Mutex<Vec<ThreadId>>> = Arc::new(Mutex::new(Vec::new()));
    let observed = Arc::clone(&seen);

    Environment::launch(move |env| {
        let disp = ActiveObjDispatcher::new(env, "ao", DispatcherParams::default());
        let mbox = env.create_mbox();
        let remaining = Arc::new(AtomicUsize::new(3));

        let mut coop = env.make_coop_with_binder(disp.binder());
        for _ in 0..3 {
            coop.add_agent(ThreadReporter {
                mbox: Arc::clone(&mbox),
                seen: Arc::clone(&seen),
                remaining: Arc::clone(&remaining),
            });
        }
        env.register_coop(coop)?;

        send(&mbox, Ping)?;
        Ok(())
    })
    .unwrap();

    let seen = observed.lock();
    assert_eq!(seen.len(), 3);
    let distinct: HashSet<ThreadId> = seen.iter().copied().collect();
    assert_eq!(distinct.len(), 3, "each agent must run on its own thread");
}

/// adv_thread_pool scheduling rule: thread-safe handlers of one agent run
/// in parallel with each other, never with the unsafe handler, and the
/// unsafe handler runs strictly alone.
#[test]
fn adv_thread_pool_safe_unsafe_scheduling() {
    #[derive(Debug)]
    struct SafeJob;
    #[derive(Debug)]
    struct UnsafeJob;

    struct Done;
    impl Signal for Done {}

    #[derive(Default)]
    struct Gauges {
        safe_active: AtomicUsize,
        unsafe_active: AtomicUsize,
        max_safe: AtomicUsize,
        violations: AtomicUsize,
        processed: AtomicUsize,
    }

    impl Gauges {
        fn track_max(&self, current: usize) {
            self.max_safe.fetch_max(current, Ordering::SeqCst);
        }
    }

    struct Mixed {
        mbox: MboxRef,
        gauges: Arc<Gauges>,
    }

    impl Agent for Mixed {
        fn so_define_agent(&mut self, ctx: &mut AgentContext<'_>) -> AgentResult {
            let mbox = Arc::clone(&self.mbox);
            ctx.so_subscribe(&mbox)
                .thread_safe_event(|this: &Mixed, _job: &SafeJob| {
                    let gauges = &this.gauges;
                    let now = gauges.safe_active.fetch_add(1, Ordering::SeqCst) + 1;
                    gauges.track_max(now);
                    if gauges.unsafe_active.load(Ordering::SeqCst) != 0 {
                        gauges.violations.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(25));
                    gauges.safe_active.fetch_sub(1, Ordering::SeqCst);
                    gauges.processed.fetch_add(1, Ordering::SeqCst);
                })?;
            ctx.so_subscribe(&mbox)
                .event(|this: &mut Mixed, _job: &UnsafeJob| {
                    let gauges = Arc::clone(&this.gauges);
                    if gauges.unsafe_active.fetch_add(1, Ordering::SeqCst) != 0
                        || gauges.safe_active.load(Ordering::SeqCst) != 0
                    {
                        gauges.violations.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                    gauges.unsafe_active.fetch_sub(1, Ordering::SeqCst);
                    gauges.processed.fetch_add(1, Ordering::SeqCst);
                })?;
            ctx.so_subscribe(&mbox)
                .event_signal_ctx::<Done, _, _, _>(|_this: &mut Mixed, ctx| {
                    ctx.so_deregister_agent_coop_normally();
                })?;
            Ok(())
        }
    }

    let gauges = Arc::new(Gauges::default());
    let observed = Arc::clone(&gauges);

    Environment::launch(move |env| {
        let pool = AdvThreadPoolDispatcher::new(
            env,
            "adv",
            AdvThreadPoolParams::new().threads(4),
        );
        let mbox = env.create_mbox();

        let mut coop = env.make_coop_with_binder(pool.binder());
        coop.add_agent(Mixed {
            mbox: Arc::clone(&mbox),
            gauges: Arc::clone(&gauges),
        });
        env.register_coop(coop)?;

        for round in 0..4 {
            for _ in 0..4 {
                send(&mbox, SafeJob)?;
            }
            if round % 2 == 0 {
                send(&mbox, UnsafeJob)?;
            }
        }
        send_signal::<Done>(&mbox)?;
        Ok(())
    })
    .unwrap();

    assert_eq!(observed.processed.load(Ordering::SeqCst), 18);
    assert_eq!(observed.violations.load(Ordering::SeqCst), 0);
    assert!(
        observed.max_safe.load(Ordering::SeqCst) >= 2,
        "thread-safe handlers must have overlapped"
    );
}
