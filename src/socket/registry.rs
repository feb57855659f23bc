//! Socket registry and blocking receive queues

use std::collections::{HashMap, VecDeque};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::debug;

use super::{unspecified_like, Endpoint, Message, OutgoingPacketRequest, SocketId, TransportProtocol};
use crate::error::{Result, StackError};
use crate::tracker::Tracker;

#[derive(Debug, Default)]
struct SocketState {
    /// Payloads for a concrete socket
    messages: VecDeque<Message>,
    /// First-contact messages and the sockets they created, for a listener
    accept_queue: VecDeque<(SocketId, Message)>,
    /// Peer and tracker of the last message handed to the application
    last_rx: Option<(Endpoint, Tracker)>,
    closed: bool,
}

/// Registered socket: identity plus its queues
#[derive(Debug)]
pub(crate) struct Socket {
    id: SocketId,
    state: Mutex<SocketState>,
    ready: Condvar,
}

impl Socket {
    fn new(id: SocketId) -> Self {
        Socket {
            id,
            state: Mutex::new(SocketState::default()),
            ready: Condvar::new(),
        }
    }

    /// Append to the receive queue; false once the socket is closed
    fn enqueue(&self, message: Message) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.messages.push_back(message);
        self.ready.notify_one();
        true
    }

    fn enqueue_pending(&self, id: SocketId, message: Message) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.accept_queue.push_back((id, message));
        self.ready.notify_one();
        true
    }

    /// Put the first-contact message ahead of anything queued since promotion
    fn push_front(&self, message: Message) {
        let mut state = self.state.lock();
        if !state.closed {
            state.messages.push_front(message);
            self.ready.notify_one();
        }
    }

    fn pop_message(&self, deadline: Option<Instant>) -> Result<Message> {
        self.wait_for(deadline, |state| {
            let message = state.messages.pop_front()?;
            state.last_rx = Some((message.remote, message.tracker));
            Some(message)
        })
    }

    fn pop_pending(&self, deadline: Option<Instant>) -> Result<(SocketId, Message)> {
        self.wait_for(deadline, |state| state.accept_queue.pop_front())
    }

    /// Block until `take` yields an item, the socket closes or the deadline passes
    fn wait_for<T, F>(&self, deadline: Option<Instant>, mut take: F) -> Result<T>
    where
        F: FnMut(&mut SocketState) -> Option<T>,
    {
        let mut state = self.state.lock();
        loop {
            if state.closed {
                return Err(StackError::SocketClosed(self.id));
            }
            if let Some(item) = take(&mut *state) {
                return Ok(item);
            }
            match deadline {
                Some(deadline) => {
                    if self.ready.wait_until(&mut state, deadline).timed_out() {
                        if state.closed {
                            return Err(StackError::SocketClosed(self.id));
                        }
                        return take(&mut *state).ok_or(StackError::TimedOut(self.id));
                    }
                }
                None => self.ready.wait(&mut state),
            }
        }
    }

    /// Mark closed, drop queued payloads and wake every waiter.
    ///
    /// Returns the promoted sockets nobody accepted.
    fn close(&self) -> Vec<SocketId> {
        let mut state = self.state.lock();
        state.closed = true;
        state.messages.clear();
        let orphans = state.accept_queue.drain(..).map(|(id, _)| id).collect();
        self.ready.notify_all();
        orphans
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    fn reply_parent(&self, remote: &Endpoint) -> Option<Tracker> {
        match self.state.lock().last_rx {
            Some((peer, tracker)) if peer == *remote => Some(tracker),
            _ => None,
        }
    }
}

/// Table of open sockets and the demultiplexer over it
///
/// Constructed once per interface; [`SocketRegistry::shutdown`] closes every
/// socket and disconnects the outbound queue.
#[derive(Debug)]
pub struct SocketRegistry {
    sockets: RwLock<HashMap<SocketId, Arc<Socket>>>,
    outbound: Mutex<Option<Sender<OutgoingPacketRequest>>>,
}

impl SocketRegistry {
    /// Registry whose sockets hand outbound datagrams to `outbound`
    pub fn new(outbound: Sender<OutgoingPacketRequest>) -> Arc<Self> {
        Arc::new(SocketRegistry {
            sockets: RwLock::new(HashMap::new()),
            outbound: Mutex::new(Some(outbound)),
        })
    }

    /// Register a socket under `id`
    pub fn open(self: &Arc<Self>, id: SocketId) -> Result<SocketHandle> {
        if !id.remote.is_wildcard()
            && !id.local.addr.is_unspecified()
            && id.local.addr.is_ipv4() != id.remote.addr.is_ipv4()
        {
            return Err(StackError::AddressFamilyMismatch(id.local.addr, id.remote.addr));
        }

        let socket = Arc::new(Socket::new(id));
        {
            let mut sockets = self.sockets.write();
            if sockets.contains_key(&id) {
                return Err(StackError::SocketAlreadyOpen(id));
            }
            sockets.insert(id, Arc::clone(&socket));
        }
        debug!("Opened {} socket {}", id.protocol, id);

        Ok(SocketHandle {
            registry: Arc::clone(self),
            socket,
        })
    }

    /// Open a listening socket on `local`
    pub fn listen(self: &Arc<Self>, protocol: TransportProtocol, local: Endpoint) -> Result<SocketHandle> {
        self.open(SocketId::listening(protocol, local))
    }

    /// Remove the socket and wake anyone blocked on it
    pub fn close(&self, handle: &SocketHandle) {
        let id = handle.socket.id;
        {
            let mut sockets = self.sockets.write();
            if sockets
                .get(&id)
                .map_or(false, |socket| Arc::ptr_eq(socket, &handle.socket))
            {
                sockets.remove(&id);
            }
        }

        for orphan in handle.socket.close() {
            let removed = self.sockets.write().remove(&orphan);
            if let Some(socket) = removed {
                socket.close();
                debug!("Dropped unaccepted socket {}", orphan);
            }
        }
        debug!("Closed {} socket {}", id.protocol, id);
    }

    /// Hand an inbound payload to the best matching socket.
    ///
    /// Lookup order, first match wins:
    /// 1. the exact (local, remote) identity
    /// 2. a listener on the packet's local address and port
    /// 3. a listener on any address with the packet's local port
    ///
    /// A listener match registers a concrete socket for the peer and queues
    /// the payload on the listener's accept queue. Returns false when nothing
    /// matched; the payload is then dropped.
    pub fn dispatch(
        &self,
        protocol: TransportProtocol,
        local: Endpoint,
        remote: Endpoint,
        payload: Bytes,
        tracker: Tracker,
    ) -> bool {
        let exact = SocketId::new(protocol, local, remote);
        let message = Message {
            local,
            remote,
            payload,
            tracker,
        };

        if let Some(socket) = self.get(&exact) {
            debug!("{} - Found matching established socket {}", tracker, exact);
            return socket.enqueue(message);
        }

        let listeners = [
            SocketId::listening(protocol, local),
            SocketId::listening(protocol, Endpoint::new(unspecified_like(&local.addr), local.port)),
        ];
        for listener_id in listeners.iter() {
            if let Some(listener) = self.get(listener_id) {
                debug!("{} - Found matching listening socket {}", tracker, listener_id);
                return self.promote(&listener, exact, message);
            }
        }

        debug!("{} - No socket matches {}", tracker, exact);
        false
    }

    fn promote(&self, listener: &Socket, id: SocketId, message: Message) -> bool {
        {
            let mut sockets = self.sockets.write();
            if let Some(existing) = sockets.get(&id).cloned() {
                drop(sockets);
                return existing.enqueue(message);
            }
            sockets.insert(id, Arc::new(Socket::new(id)));
        }

        if listener.enqueue_pending(id, message) {
            debug!("Opened {} socket {} for {}", id.protocol, id, listener.id);
            true
        } else {
            self.sockets.write().remove(&id);
            false
        }
    }

    /// Block until a payload is queued on `handle`, then pop it
    pub fn receive(&self, handle: &SocketHandle) -> Result<Message> {
        Self::connected(handle)?;
        handle.socket.pop_message(None)
    }

    /// Like [`SocketRegistry::receive`], giving up after `timeout`
    pub fn receive_timeout(&self, handle: &SocketHandle, timeout: Duration) -> Result<Message> {
        Self::connected(handle)?;
        handle.socket.pop_message(Some(Instant::now() + timeout))
    }

    /// Block until a peer makes first contact with a listening socket
    ///
    /// The returned socket already holds the first-contact payload.
    pub fn accept(&self, handle: &SocketHandle) -> Result<SocketHandle> {
        if !handle.socket.id.is_listening() {
            return Err(StackError::NotListening(handle.socket.id));
        }

        loop {
            let (id, message) = handle.socket.pop_pending(None)?;
            // Skip sockets torn down before being accepted
            if let Some(socket) = self.get(&id) {
                socket.push_front(message);
                debug!("Accepted {} socket {}", id.protocol, id);
                return Ok(SocketHandle {
                    registry: Arc::clone(&handle.registry),
                    socket,
                });
            }
        }
    }

    /// Close every socket and disconnect the outbound queue
    pub fn shutdown(&self) {
        let sockets: Vec<Arc<Socket>> = self.sockets.write().drain().map(|(_, s)| s).collect();
        for socket in &sockets {
            socket.close();
        }
        self.outbound.lock().take();
        debug!("Socket registry shut down, {} sockets closed", sockets.len());
    }

    pub fn len(&self) -> usize {
        self.sockets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sockets.read().is_empty()
    }

    pub fn contains(&self, id: &SocketId) -> bool {
        self.sockets.read().contains_key(id)
    }

    fn get(&self, id: &SocketId) -> Option<Arc<Socket>> {
        self.sockets.read().get(id).cloned()
    }

    fn connected(handle: &SocketHandle) -> Result<()> {
        if handle.socket.id.is_listening() {
            return Err(StackError::NotConnected(handle.socket.id));
        }
        Ok(())
    }

    fn send(&self, socket: &Socket, remote: Endpoint, payload: Bytes) -> Result<()> {
        let id = socket.id;
        if id.protocol == TransportProtocol::Tcp {
            return Err(StackError::Unsupported("sending on TCP sockets"));
        }
        if socket.is_closed() {
            return Err(StackError::SocketClosed(id));
        }
        if !id.local.addr.is_unspecified() && id.local.addr.is_ipv4() != remote.addr.is_ipv4() {
            return Err(StackError::AddressFamilyMismatch(id.local.addr, remote.addr));
        }

        let request = OutgoingPacketRequest {
            protocol: id.protocol,
            local: id.local,
            remote,
            payload,
            parent: socket.reply_parent(&remote),
        };
        let outbound = self.outbound.lock();
        let sender = outbound.as_ref().ok_or(StackError::QueueClosed)?;
        sender.send(request).map_err(|_| StackError::QueueClosed)
    }
}

/// Application-side handle of an open socket
#[derive(Debug, Clone)]
pub struct SocketHandle {
    registry: Arc<SocketRegistry>,
    socket: Arc<Socket>,
}

impl SocketHandle {
    pub fn id(&self) -> SocketId {
        self.socket.id
    }

    pub fn is_listening(&self) -> bool {
        self.socket.id.is_listening()
    }

    /// Send to the connected peer
    pub fn send(&self, payload: impl Into<Bytes>) -> Result<()> {
        let id = self.socket.id;
        if id.is_listening() {
            return Err(StackError::NotConnected(id));
        }
        self.registry.send(&self.socket, id.remote, payload.into())
    }

    /// Send to an explicit peer
    pub fn send_to(&self, remote: Endpoint, payload: impl Into<Bytes>) -> Result<()> {
        self.registry.send(&self.socket, remote, payload.into())
    }

    /// Next payload, blocking until one arrives
    pub fn receive(&self) -> Result<Bytes> {
        self.registry.receive(self).map(|message| message.payload)
    }

    /// Next message with its endpoints, blocking until one arrives
    pub fn receive_from(&self) -> Result<Message> {
        self.registry.receive(self)
    }

    pub fn receive_timeout(&self, timeout: Duration) -> Result<Bytes> {
        self.registry
            .receive_timeout(self, timeout)
            .map(|message| message.payload)
    }

    pub fn accept(&self) -> Result<SocketHandle> {
        self.registry.accept(self)
    }

    pub fn close(&self) {
        self.registry.close(self)
    }
}
