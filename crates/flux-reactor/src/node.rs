// Copyright 2026 The Flux Authors
// Licensed under the Apache License, Version 2.0
// http://www.apache.org/licenses/LICENSE-2.0

//! Publisher nodes: the reactor's unit of spawning (spec section 4.7,
//! `stream!`/`signal!`). A [`Node`] owns exactly one subscription to its
//! upstream flow and fans that single sequence of values out to any
//! number of downstream subscribers — the "subscribable any number of
//! times from within the reactor" property a bare `Flow` cannot offer,
//! since subscribing a `Flow` consumes it.
//!
//! Every node registers a [`DynNode`] driver with the owning reactor
//! instead of pumping itself on its own task. The reactor steps every
//! live driver once per sweep, in the order nodes were registered — since
//! a node can only be built from another node's [`Node::flow`] output
//! after that node already exists, registration order is a valid
//! topological order of the dependency graph. One sweep is one round
//! (spec section 4.7): a node is visited at most once per round, and a
//! continuous (signal) node that drains more than one buffered value in
//! a single sweep keeps only the last, so a downstream subscriber never
//! observes an intermediate combination that is about to change again in
//! the same round.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use flux_core::{CancelHandle, Flow, Transfer};
use flux_error::FluxError;
use flux_fiber::{FlowPump, TryRecv};

use crate::ctx::ReactorInner;

type SharedNotify = Arc<dyn Fn() + Send + Sync>;

/// Whether a node behaves as a discrete stream or a continuous signal —
/// the same distinction spec section 3 draws for plain flows, now applied
/// to a fan-out publisher.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NodeKind {
    /// Each upstream value is delivered once to every subscriber.
    Stream,
    /// Subscribers are replayed the latest value immediately on
    /// subscription, then notified again on every subsequent change.
    Signal,
}

struct SubscriberEntry<T> {
    queue: VecDeque<Result<T, FluxError>>,
    notify: SharedNotify,
    terminate_pending: bool,
    alive: bool,
}

struct NodeState<T> {
    kind: NodeKind,
    subscribers: Mutex<Vec<SubscriberEntry<T>>>,
    current: Mutex<Option<T>>,
    terminated: AtomicBool,
    next_subscriber_id: AtomicU64,
}

impl<T: Clone + Send + 'static> NodeState<T> {
    fn broadcast(&self, value: Result<T, FluxError>) {
        if self.kind == NodeKind::Signal {
            if let Ok(v) = &value {
                *self.current.lock() = Some(v.clone());
            }
        }
        for sub in self.subscribers.lock().iter_mut() {
            if !sub.alive {
                continue;
            }
            sub.queue.push_back(value.clone());
            (sub.notify)();
        }
    }

    fn finish(&self, failure: Option<FluxError>) {
        self.terminated.store(true, Ordering::Release);
        let mut subs = self.subscribers.lock();
        for sub in subs.iter_mut() {
            if !sub.alive {
                continue;
            }
            if let Some(e) = &failure {
                sub.queue.push_back(Err(e.clone_for_fanout()));
                (sub.notify)();
            }
            sub.terminate_pending = true;
            if sub.queue.is_empty() {
                // nothing buffered: the subscriber's own transfer closure
                // would never get a last-transfer chance to notice
                // `terminate_pending`, so fire right away.
                (sub.notify)();
            }
        }
    }
}

/// A publisher node spawned via [`crate::ReactorCtx::stream`] or
/// [`crate::ReactorCtx::signal`]. Cloneable; every clone shares the same
/// underlying upstream subscription and subscriber list.
pub struct Node<T> {
    state: Arc<NodeState<T>>,
}

impl<T> Clone for Node<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Node<T> {
    pub(crate) fn spawn(upstream: Flow<T>, kind: NodeKind, reactor: Arc<ReactorInner>) -> Self {
        let state = Arc::new(NodeState {
            kind,
            subscribers: Mutex::new(Vec::new()),
            current: Mutex::new(None),
            terminated: AtomicBool::new(false),
            next_subscriber_id: AtomicU64::new(0),
        });

        reactor.register_node();
        let wake = reactor.wake_handle();
        let mut pump = FlowPump::new_with_wake(upstream, wake);
        if let Some(cancel) = pump.cancel_handle() {
            reactor.track_cancel(cancel);
        }

        let driver = NodeDriver {
            pump,
            state: state.clone(),
            reactor: reactor.clone(),
            pending_signal: None,
            finished: false,
        };
        reactor.register_driver(Box::new(driver));

        Self { state }
    }

    /// Mint a fresh, independently-consumable `Flow` fed by this node's
    /// broadcast. Every minted flow receives the same upstream sequence
    /// from the point it is subscribed onward (signals additionally
    /// replay the then-current value immediately).
    #[must_use]
    pub fn flow(&self) -> Flow<T> {
        let id = self.state.next_subscriber_id.fetch_add(1, Ordering::Relaxed);
        let state = self.state.clone();

        Flow::new(move |on_notify, on_terminate| {
            let on_notify: SharedNotify = Arc::from(on_notify);
            let on_terminate: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>> =
                Arc::new(Mutex::new(Some(on_terminate)));

            {
                let mut subs = state.subscribers.lock();
                let mut queue = VecDeque::new();
                if state.kind == NodeKind::Signal {
                    if let Some(v) = state.current.lock().clone() {
                        queue.push_back(Ok(v));
                    }
                }
                let terminate_pending = state.terminated.load(Ordering::Acquire);
                subs.push(SubscriberEntry {
                    queue,
                    notify: on_notify.clone(),
                    terminate_pending,
                    alive: true,
                });
                if !subs.last().unwrap().queue.is_empty() || terminate_pending {
                    on_notify();
                }
            }

            let state_for_cancel = state.clone();
            let terminate_for_cancel = on_terminate.clone();
            let cancel = CancelHandle::new(move || {
                let mut subs = state_for_cancel.subscribers.lock();
                if let Some(sub) = subscriber_mut(&mut subs, id) {
                    sub.alive = false;
                    sub.queue.clear();
                }
                drop(subs);
                if let Some(f) = terminate_for_cancel.lock().take() {
                    f();
                }
            });

            let state_for_transfer = state.clone();
            let terminate_for_transfer = on_terminate.clone();

            Transfer::new(
                move || {
                    let mut subs = state_for_transfer.subscribers.lock();
                    let sub = subscriber_mut(&mut subs, id)
                        .expect("subscriber registered at construction");
                    if let Some(result) = sub.queue.pop_front() {
                        let should_terminate = sub.terminate_pending && sub.queue.is_empty();
                        drop(subs);
                        if should_terminate {
                            if let Some(f) = terminate_for_transfer.lock().take() {
                                f();
                            }
                        }
                        return result;
                    }
                    let should_terminate = sub.terminate_pending;
                    drop(subs);
                    if should_terminate {
                        if let Some(f) = terminate_for_transfer.lock().take() {
                            f();
                        }
                    }
                    Err(FluxError::protocol_violation(
                        "reactor node: transfer called without a pending notification",
                    ))
                },
                cancel,
            )
        })
    }
}

/// The outcome of one [`DynNode::step`] call within a scheduler sweep.
pub(crate) enum NodeStep {
    /// The node had at least one value ready this round and broadcast it.
    Fired,
    /// Nothing was ready this round.
    Pending,
    /// The node's upstream terminated; it should be dropped from the
    /// active driver list.
    Terminated,
}

/// A type-erased node driver, steppable by the reactor's round scheduler
/// without knowing the node's value type.
pub(crate) trait DynNode: Send {
    fn step(&mut self) -> NodeStep;
}

/// Drives one [`Node`]'s upstream pump from the reactor's scheduler sweep.
struct NodeDriver<T> {
    pump: FlowPump<T>,
    state: Arc<NodeState<T>>,
    reactor: Arc<ReactorInner>,
    /// A signal node's most recently drained value this sweep, broadcast
    /// once at the end of the sweep rather than per notification — this
    /// is what keeps a combinator fed by more than one upstream signal
    /// from observing a stale sibling mid-round.
    pending_signal: Option<T>,
    finished: bool,
}

impl<T: Clone + Send + 'static> DynNode for NodeDriver<T> {
    fn step(&mut self) -> NodeStep {
        if self.finished {
            return NodeStep::Terminated;
        }
        let mut fired = false;
        loop {
            match self.pump.try_recv() {
                TryRecv::Ready(Err(e)) => {
                    self.state.finish(Some(e.clone_for_fanout()));
                    self.reactor.node_finished(Some(e));
                    self.finished = true;
                    return NodeStep::Terminated;
                }
                TryRecv::Ready(Ok(v)) => {
                    fired = true;
                    match self.state.kind {
                        // every discrete value matters; broadcast it now
                        // instead of folding it away as a stale draft.
                        NodeKind::Stream => self.state.broadcast(Ok(v)),
                        NodeKind::Signal => self.pending_signal = Some(v),
                    }
                }
                TryRecv::Terminated => {
                    if let Some(v) = self.pending_signal.take() {
                        self.state.broadcast(Ok(v));
                    }
                    self.state.finish(None);
                    self.reactor.node_finished(None);
                    self.finished = true;
                    return NodeStep::Terminated;
                }
                TryRecv::Pending => break,
            }
        }
        if let Some(v) = self.pending_signal.take() {
            self.state.broadcast(Ok(v));
        }
        if fired {
            NodeStep::Fired
        } else {
            NodeStep::Pending
        }
    }
}

// Subscribers are appended, never reordered or removed (only marked
// dead), so the registration index doubles as a stable id.
fn subscriber_mut<T>(subs: &mut [SubscriberEntry<T>], id: u64) -> Option<&mut SubscriberEntry<T>> {
    subs.get_mut(id as usize)
}

trait CloneForFanout {
    fn clone_for_fanout(&self) -> Self;
}

impl CloneForFanout for FluxError {
    fn clone_for_fanout(&self) -> Self {
        FluxError::message(self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flux_flow::enumerate;
    use std::sync::atomic::AtomicUsize;

    fn drain<T: Send + 'static>(flow: Flow<T>) -> (Vec<Result<T, FluxError>>, usize) {
        let pending = Arc::new(AtomicUsize::new(0));
        let terminated = Arc::new(AtomicUsize::new(0));
        let pending_notify = pending.clone();
        let terminated_cb = terminated.clone();
        let mut transfer = flow.subscribe(
            move || {
                pending_notify.fetch_add(1, Ordering::SeqCst);
            },
            move || {
                terminated_cb.fetch_add(1, Ordering::SeqCst);
            },
        );
        let mut seen = Vec::new();
        loop {
            std::thread::yield_now();
            if pending.swap(0, Ordering::SeqCst) > 0 {
                seen.push(transfer.transfer());
            } else if terminated.load(Ordering::SeqCst) > 0 {
                break;
            }
        }
        (seen, terminated.load(Ordering::SeqCst))
    }

    fn test_reactor() -> Arc<ReactorInner> {
        crate::ctx::test_support::fresh_inner()
    }

    #[tokio::test]
    async fn stream_node_delivers_every_value_to_a_single_subscriber() {
        let (results, terminated) = tokio::task::spawn_blocking(move || {
            let node = Node::spawn(enumerate(vec![1, 2, 3]), NodeKind::Stream, test_reactor());
            drain(node.flow())
        })
        .await
        .unwrap();
        let values: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![1, 2, 3]);
        assert_eq!(terminated, 1);
    }

    #[tokio::test]
    async fn stream_node_fans_out_the_same_sequence_to_every_subscriber() {
        // Both subscribers must register before the node's upstream is
        // drained, or a late subscriber to a `Stream` node (no replay)
        // would see nothing — so both are subscribed up front and then
        // drained concurrently, rather than one after the other.
        let (a, b) = tokio::task::spawn_blocking(move || {
            let node = Node::spawn(enumerate(vec![1, 2, 3]), NodeKind::Stream, test_reactor());
            let flow_a = node.flow();
            let flow_b = node.flow();

            let pending_a = Arc::new(AtomicUsize::new(0));
            let terminated_a = Arc::new(AtomicUsize::new(0));
            let (pa, ta) = (pending_a.clone(), terminated_a.clone());
            let mut transfer_a = flow_a.subscribe(move || { pa.fetch_add(1, Ordering::SeqCst); }, move || { ta.fetch_add(1, Ordering::SeqCst); });

            let pending_b = Arc::new(AtomicUsize::new(0));
            let terminated_b = Arc::new(AtomicUsize::new(0));
            let (pb, tb) = (pending_b.clone(), terminated_b.clone());
            let mut transfer_b = flow_b.subscribe(move || { pb.fetch_add(1, Ordering::SeqCst); }, move || { tb.fetch_add(1, Ordering::SeqCst); });

            let mut seen_a = Vec::new();
            let mut seen_b = Vec::new();
            loop {
                std::thread::yield_now();
                if pending_a.swap(0, Ordering::SeqCst) > 0 {
                    seen_a.push(transfer_a.transfer());
                }
                if pending_b.swap(0, Ordering::SeqCst) > 0 {
                    seen_b.push(transfer_b.transfer());
                }
                if terminated_a.load(Ordering::SeqCst) > 0 && terminated_b.load(Ordering::SeqCst) > 0 {
                    break;
                }
            }
            (seen_a, seen_b)
        })
        .await
        .unwrap();
        let values_a: Vec<i32> = a.into_iter().map(Result::unwrap).collect();
        let values_b: Vec<i32> = b.into_iter().map(Result::unwrap).collect();
        assert_eq!(values_a, vec![1, 2, 3]);
        assert_eq!(values_b, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn signal_node_replays_current_value_to_a_late_subscriber() {
        let (first, second) = tokio::task::spawn_blocking(move || {
            let node = Node::spawn(enumerate(vec![1, 2, 3]), NodeKind::Signal, test_reactor());
            let early = drain(node.flow());
            // by the time the first subscriber has drained everything the
            // node has certainly observed its last upstream value.
            let late = drain(node.flow());
            (early, late)
        })
        .await
        .unwrap();
        let early_values: Vec<i32> = first.0.into_iter().map(Result::unwrap).collect();
        let late_values: Vec<i32> = second.0.into_iter().map(Result::unwrap).collect();
        assert_eq!(early_values, vec![1, 2, 3]);
        assert_eq!(late_values, vec![3]);
    }

    #[tokio::test]
    async fn diamond_composition_never_observes_a_mid_round_glitch() {
        use flux_flow::{latest, map, transform};

        let results = tokio::task::spawn_blocking(move || {
            let reactor = test_reactor();
            let root = Node::spawn(enumerate(vec![1, 2, 3]), NodeKind::Stream, reactor.clone());
            let left = Node::spawn(
                transform(map(|x: i32| x * 10), root.flow()),
                NodeKind::Signal,
                reactor.clone(),
            );
            let right = Node::spawn(
                transform(map(|x: i32| x + 1), root.flow()),
                NodeKind::Signal,
                reactor.clone(),
            );
            let diamond = Node::spawn(
                latest(|vals: Vec<i32>| vals[0] + vals[1], vec![left.flow(), right.flow()]),
                NodeKind::Signal,
                reactor.clone(),
            );
            let result = drain(diamond.flow());
            (result, reactor.round())
        })
        .await
        .unwrap();
        let ((results, terminated), rounds) = results;
        // each value is `x*10 + (x+1)` for the root value that produced
        // it; a glitch would surface as a combination straddling two
        // rounds (e.g. 20+2=22, round 2's `left` against round 1's
        // `right`) appearing before the settled 23.
        let values: Vec<i32> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![12, 23, 34]);
        assert_eq!(terminated, 1);
        // three source values propagated through four nodes each: more
        // than one sweep had to run for this to settle.
        assert!(rounds > 1);
    }

    #[tokio::test]
    async fn cycle_through_shared_state_terminates_without_deadlock() {
        use flux_flow::{watch, SharedCell};

        let observed = tokio::task::spawn_blocking(move || {
            let cell = SharedCell::new(0i32);
            let node = Node::spawn(watch(cell.clone()), NodeKind::Signal, test_reactor());

            let pending = Arc::new(AtomicUsize::new(0));
            let terminated = Arc::new(AtomicUsize::new(0));
            let (p, t) = (pending.clone(), terminated.clone());
            let mut transfer = node.flow().subscribe(
                move || {
                    p.fetch_add(1, Ordering::SeqCst);
                },
                move || {
                    t.fetch_add(1, Ordering::SeqCst);
                },
            );

            let mut seen = Vec::new();
            loop {
                std::thread::yield_now();
                if pending.swap(0, Ordering::SeqCst) > 0 {
                    if let Ok(v) = transfer.transfer() {
                        seen.push(v);
                        // node A's own output feeds back into its upstream
                        // cell from outside the graph: a cycle the reactor
                        // must not deadlock or spin forever on.
                        if v < 5 {
                            cell.set(v + 1);
                        } else {
                            transfer.cancel();
                            break;
                        }
                    }
                }
            }
            seen
        })
        .await
        .unwrap();
        assert_eq!(observed, vec![0, 1, 2, 3, 4, 5]);
    }
}
