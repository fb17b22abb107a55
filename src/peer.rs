use crate::{error::fatal, mesh::PeerChannels, *};
use std::sync::Arc;
use tokio::{
    sync::{
        mpsc::{self, Sender, UnboundedReceiver, UnboundedSender},
        Mutex, Notify, OwnedMutexGuard,
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

/// Enum that tells where a process is in its request cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Requesting,
    Holding,
    Releasing,
}

/// State shared by the activities of one process, always accessed under its lock.
pub struct PeerState {
    pub id: ProcessId,
    pub peers: usize,
    pub clock: LogicalClock,
    pub queue: RequestQueue,
    pub receipts: PeerReceiptVector,
    pub phase: Phase,
    pub own_request: Option<Request>,
    outbox: UnboundedSender<Outgoing>,
    cycle: Option<OwnedMutexGuard<()>>,
}

impl PeerState {
    pub fn new(id: ProcessId, peers: usize, outbox: UnboundedSender<Outgoing>) -> Self {
        Self {
            id,
            peers,
            clock: LogicalClock::new(),
            queue: RequestQueue::new(),
            receipts: PeerReceiptVector::new(id, peers),
            phase: Phase::Idle,
            own_request: None,
            outbox,
            cycle: None,
        }
    }

    /// Stamps a message with the current time and queues it for `to`. Sending is an event.
    fn send(&mut self, to: ProcessId, kind: MessageKind, request: Option<Request>) {
        let id = self.id;
        let message = Message::new(kind, Timestamp::new(self.clock.now(), id), request);
        if self.outbox.send(Outgoing { to, message }).is_err() {
            log::warn(&format!("P{id} has no dispatcher left, dropping a message for P{to}."));
        }
        self.clock.tick();
    }

    /// Sends `request` to every other process, one clock tick per send.
    pub fn broadcast(&mut self, kind: MessageKind, request: Request) {
        let id = self.id;
        for peer in (0..self.peers).filter(|peer| *peer != id) {
            self.send(peer, kind, Some(request));
        }
    }

    pub fn issue_request(&mut self) -> Request {
        self.clock.tick();
        let request = Request::new(self.clock.now(), self.id);

        self.queue.apply_request(request);
        self.own_request = Some(request);
        self.phase = Phase::Requesting;
        self.broadcast(MessageKind::RequestResource, request);

        request
    }

    /// Folds an inbound message into the clock, the receipts and the queue.
    ///
    /// A request is answered with an acknowledgment so the requester always ends up hearing
    /// from this process at a later time.
    pub fn receive(&mut self, message: Message) -> Result<(), ProtocolViolation> {
        let sender = message.sender;

        self.clock.observe(message.timestamp.time);
        self.receipts.record(sender, message.timestamp.time)?;

        match message.kind {
            MessageKind::RequestResource => {
                let request = message
                    .request
                    .ok_or(ProtocolViolation::MissingRequest { sender })?;
                self.queue.apply_request(request);
                self.send(sender, MessageKind::Acknowledgment, None);
            }
            MessageKind::ReleaseResource => {
                let request = message
                    .request
                    .ok_or(ProtocolViolation::MissingRequest { sender })?;
                let queued = self.queue.apply_release(request.process)?;
                if queued != request {
                    return Err(ProtocolViolation::StaleRelease {
                        queued: queued.timestamp,
                        released: request.timestamp,
                    });
                }
            }
            MessageKind::Acknowledgment => {}
        }

        Ok(())
    }

    /// Occupies the resource if the grant rule holds for the outstanding request.
    pub fn try_grant(
        &mut self,
        guard: &ResourceGuard,
    ) -> Result<Option<Request>, ProtocolViolation> {
        let Some(request) = self.own_request.filter(|_| self.phase == Phase::Requesting) else {
            return Ok(None);
        };
        if !self
            .queue
            .can_grant(self.id, self.receipts.min_receive_time())
        {
            return Ok(None);
        }

        self.clock.tick();
        guard.occupy(request.timestamp)?;
        self.phase = Phase::Holding;

        Ok(Some(request))
    }

    pub fn release(&mut self, guard: &ResourceGuard) -> Result<Request, ProtocolViolation> {
        let request = match (self.phase, self.own_request) {
            (Phase::Holding, Some(request)) => request,
            _ => return Err(ProtocolViolation::NotHolding { process: self.id }),
        };

        self.phase = Phase::Releasing;
        guard.release(request.timestamp)?;

        let queued = self.queue.apply_release(self.id)?;
        if queued != request {
            return Err(ProtocolViolation::StaleRelease {
                queued: queued.timestamp,
                released: request.timestamp,
            });
        }
        self.own_request = None;

        self.clock.tick();
        self.broadcast(MessageKind::ReleaseResource, request);

        self.phase = Phase::Idle;
        // lets the next request() of this process through
        self.cycle = None;

        Ok(request)
    }
}

struct Inner {
    id: ProcessId,
    state: Mutex<PeerState>,
    // held from request() until the matching release()
    cycle: Arc<Mutex<()>>,
    evaluate: Notify,
    granted: Notify,
    guard: ResourceGuard,
    shutdown: CancellationToken,
    // cancelled once a background activity hit a violation
    poisoned: CancellationToken,
    violation: parking_lot::Mutex<Option<ProtocolViolation>>,
    tasks: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    /// Records `violation` for the callers of this process, then aborts the current activity.
    fn poison(&self, violation: ProtocolViolation) -> ! {
        *self.violation.lock() = Some(violation.clone());
        self.poisoned.cancel();
        fatal(self.id, violation)
    }

    /// Re-raises a violation recorded by a background activity on the caller's stack.
    fn resurface(&self) -> ! {
        let violation = self.violation.lock().clone();
        match violation {
            Some(violation) => fatal(self.id, violation),
            None => panic!("P{} was aborted without a recorded violation", self.id),
        }
    }
}

/// One process of the mesh.
///
/// Cheap to clone; every clone drives the same process.
#[derive(Clone)]
pub struct ProcessAgent {
    inner: Arc<Inner>,
}

impl ProcessAgent {
    /// Function that creates process `id` and launches its receive loop, grant evaluator and
    /// outbound dispatcher. Must be called from within a tokio runtime.
    pub fn start(id: ProcessId, channels: PeerChannels, guard: ResourceGuard) -> Self {
        let PeerChannels { inbound, outbound } = channels;
        let (outbox, outbox_receiver) = mpsc::unbounded_channel();

        let agent = Self {
            inner: Arc::new(Inner {
                id,
                state: Mutex::new(PeerState::new(id, outbound.len(), outbox)),
                cycle: Arc::new(Mutex::new(())),
                evaluate: Notify::new(),
                granted: Notify::new(),
                guard,
                shutdown: CancellationToken::new(),
                poisoned: CancellationToken::new(),
                violation: parking_lot::Mutex::new(None),
                tasks: parking_lot::Mutex::new(Vec::new()),
            }),
        };

        let receive_thread = {
            let inner = Arc::clone(&agent.inner);
            let mut inbound = inbound;

            tokio::spawn(async move {
                loop {
                    let message = tokio::select! {
                        _ = inner.shutdown.cancelled() => break,
                        message = inbound.recv() => match message {
                            Some(message) => message,
                            None => break,
                        },
                    };

                    let id = inner.id;
                    log::debug(&format!("P{id} received {message}."));
                    {
                        let mut state = inner.state.lock().await;
                        if let Err(violation) = state.receive(message) {
                            inner.poison(violation);
                        }
                    }
                    inner.evaluate.notify_one();
                }
            })
        };

        let grant_thread = {
            let inner = Arc::clone(&agent.inner);

            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = inner.shutdown.cancelled() => break,
                        _ = inner.evaluate.notified() => {}
                    }

                    let mut state = inner.state.lock().await;
                    match state.try_grant(&inner.guard) {
                        Ok(Some(request)) => {
                            let id = inner.id;
                            log::info(&format!("P{id} holds the resource for {request}."));
                            inner.granted.notify_one();
                        }
                        Ok(None) => {}
                        Err(violation) => inner.poison(violation),
                    }
                }
            })
        };

        let dispatch_thread = tokio::spawn(Self::dispatch(
            id,
            outbox_receiver,
            outbound,
            agent.inner.shutdown.clone(),
        ));

        *agent.inner.tasks.lock() = vec![receive_thread, grant_thread, dispatch_thread];
        agent
    }

    /// Forwards stamped messages to their peers in stamp order. A full peer channel stalls
    /// only this loop.
    async fn dispatch(
        id: ProcessId,
        mut outbox: UnboundedReceiver<Outgoing>,
        outbound: Vec<Sender<Message>>,
        shutdown: CancellationToken,
    ) {
        loop {
            let Outgoing { to, message } = tokio::select! {
                _ = shutdown.cancelled() => break,
                outgoing = outbox.recv() => match outgoing {
                    Some(outgoing) => outgoing,
                    None => break,
                },
            };

            let Some(peer) = outbound.get(to) else {
                log::warn(&format!("P{id} has no channel to P{to}."));
                continue;
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                result = peer.send(message) => {
                    if result.is_err() {
                        log::warn(&format!("P{id} couldn't reach P{to}, its channel is closed."));
                    }
                }
            }
        }
    }

    /// Asks for the resource and returns once it is held.
    ///
    /// Waits for the previous cycle of this process to be released first. Aborts if a
    /// background activity of this process broke the protocol.
    pub async fn request(&self) -> Request {
        let cycle = tokio::select! {
            _ = self.inner.poisoned.cancelled() => self.inner.resurface(),
            cycle = Arc::clone(&self.inner.cycle).lock_owned() => cycle,
        };

        let request = {
            let mut state = self.inner.state.lock().await;
            let request = state.issue_request();
            state.cycle = Some(cycle);
            request
        };
        let id = self.inner.id;
        log::info(&format!("P{id} requests the resource at {request}."));

        self.inner.evaluate.notify_one();
        tokio::select! {
            _ = self.inner.poisoned.cancelled() => self.inner.resurface(),
            _ = self.inner.granted.notified() => {}
        }
        request
    }

    /// Gives the resource back. Aborts if this process does not hold it.
    pub async fn release(&self) -> Request {
        if self.inner.poisoned.is_cancelled() {
            self.inner.resurface();
        }
        let id = self.inner.id;
        let mut state = self.inner.state.lock().await;
        match state.release(&self.inner.guard) {
            Ok(request) => {
                log::info(&format!("P{id} released the resource of {request}."));
                request
            }
            Err(violation) => fatal(id, violation),
        }
    }

    /// Stops the background activities and waits for them to finish.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let tasks = std::mem::take(&mut *self.inner.tasks.lock());

        let id = self.inner.id;
        for result in futures::future::join_all(tasks).await {
            if let Err(e) = result {
                log::error(&format!("P{id} stopped abnormally: {e}"));
            }
        }
    }

    pub fn id(&self) -> ProcessId {
        self.inner.id
    }

    pub async fn phase(&self) -> Phase {
        self.inner.state.lock().await.phase
    }

    pub async fn now(&self) -> LogicalTime {
        self.inner.state.lock().await.clock.now()
    }

    /// Requests this process currently knows to be outstanding, in timestamp order.
    pub async fn queued(&self) -> Vec<Request> {
        self.inner.state.lock().await.queue.sorted()
    }
}
