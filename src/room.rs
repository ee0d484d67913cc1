use std::collections::VecDeque;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU64, Ordering}
};

use bytes::Bytes;
use dashmap::DashMap;
use tracing::info;

/// One broadcast payload: whatever byte span a single read produced.
pub type Message = Bytes;

pub type ParticipantId = u64;

/// How many messages the room keeps for replay to late joiners.
pub const MAX_RECENT_MSGS: usize = 100;

/// Anything that can receive a broadcast. `deliver` must not block; it
/// only enqueues.
pub trait Participant: Send + Sync {
    fn id(&self) -> ParticipantId;

    fn deliver(&self, msg: Message);
}

pub struct Room {
    participants: DashMap<ParticipantId, Arc<dyn Participant>>,
    // Serialization point: held across every history mutation and the
    // replay/fan-out enqueueing that follows it, so every participant's
    // outbound queue sees messages in room arrival order.
    recent: Mutex<VecDeque<Message>>,
    next_id: AtomicU64
}

impl Room {
    pub fn new() -> Self {
        Self {
            participants: DashMap::new(),
            recent: Mutex::new(VecDeque::with_capacity(MAX_RECENT_MSGS)),
            next_id: AtomicU64::new(1)
        }
    }

    /// Hands out a process-unique id for a new participant.
    pub fn next_id(&self) -> ParticipantId {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Adds a participant and replays the recent history to it, oldest
    /// first. Joining twice with the same id is a no-op for membership.
    pub fn join(&self, participant: Arc<dyn Participant>) {
        let recent = self.recent.lock().unwrap();

        self.participants.insert(participant.id(), participant.clone());

        for msg in recent.iter() {
            participant.deliver(msg.clone());
        }

        info!(id = participant.id(), "participant joined the room");
    }

    /// Removes a participant if present. Safe to call twice: the read
    /// path, the write path, and a mid-fan-out eviction may all race here.
    pub fn leave(&self, id: ParticipantId) {
        if self.participants.remove(&id).is_some() {
            info!(id, "participant left the room");
        }
    }

    /// Appends to the history (evicting past capacity) and fans the
    /// message out to every current participant.
    pub fn deliver(&self, msg: Message) {
        let mut recent = self.recent.lock().unwrap();

        recent.push_back(msg.clone());
        while recent.len() > MAX_RECENT_MSGS {
            recent.pop_front();
        }

        // Snapshot before fanning out: a participant's deliver may call
        // leave() on this room mid-iteration.
        let targets: Vec<Arc<dyn Participant>> = self
            .participants
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        for participant in targets {
            participant.deliver(msg.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        id: ParticipantId,
        received: Mutex<Vec<Message>>
    }

    impl Probe {
        fn join(room: &Room) -> Arc<Self> {
            let probe = Arc::new(Self {
                id: room.next_id(),
                received: Mutex::new(Vec::new())
            });

            room.join(probe.clone());
            probe
        }

        fn received(&self) -> Vec<Message> {
            self.received.lock().unwrap().clone()
        }
    }

    impl Participant for Probe {
        fn id(&self) -> ParticipantId {
            self.id
        }

        fn deliver(&self, msg: Message) {
            self.received.lock().unwrap().push(msg);
        }
    }

    /// Receives once, then throws itself out of the room.
    struct OneShot {
        id: ParticipantId,
        room: Arc<Room>,
        received: Mutex<Vec<Message>>
    }

    impl Participant for OneShot {
        fn id(&self) -> ParticipantId {
            self.id
        }

        fn deliver(&self, msg: Message) {
            self.received.lock().unwrap().push(msg);
            self.room.leave(self.id);
        }
    }

    fn msg(text: &str) -> Message {
        Bytes::copy_from_slice(text.as_bytes())
    }

    #[test]
    fn history_is_bounded_and_keeps_the_newest() {
        let room = Room::new();

        for i in 0..150 {
            room.deliver(msg(&format!("m{i}")));
        }

        let late = Probe::join(&room);
        let replayed = late.received();

        assert_eq!(replayed.len(), MAX_RECENT_MSGS);
        assert_eq!(replayed[0], msg("m50"));
        assert_eq!(replayed[99], msg("m149"));
    }

    #[test]
    fn join_replays_history_before_live_traffic() {
        let room = Room::new();

        room.deliver(msg("a"));
        room.deliver(msg("b"));
        room.deliver(msg("c"));

        let late = Probe::join(&room);
        assert_eq!(late.received(), vec![msg("a"), msg("b"), msg("c")]);

        room.deliver(msg("d"));
        assert_eq!(
            late.received(),
            vec![msg("a"), msg("b"), msg("c"), msg("d")]
        );
    }

    #[test]
    fn leave_is_idempotent() {
        let room = Room::new();

        let a = Probe::join(&room);
        let b = Probe::join(&room);

        room.leave(a.id);
        room.leave(a.id);
        room.leave(9999); // never joined

        room.deliver(msg("after"));

        assert_eq!(a.received(), Vec::<Message>::new());
        assert_eq!(b.received(), vec![msg("after")]);
    }

    #[test]
    fn participants_see_messages_in_delivery_order() {
        let room = Room::new();
        let p = Probe::join(&room);

        for i in 0..20 {
            room.deliver(msg(&format!("{i}")));
        }

        let expected: Vec<Message> = (0..20).map(|i| msg(&format!("{i}"))).collect();
        assert_eq!(p.received(), expected);
    }

    #[test]
    fn fan_out_survives_a_leave_during_delivery() {
        let room = Arc::new(Room::new());

        let a = Probe::join(&room);
        let b = Arc::new(OneShot {
            id: room.next_id(),
            room: room.clone(),
            received: Mutex::new(Vec::new())
        });
        room.join(b.clone());
        let c = Probe::join(&room);

        room.deliver(msg("first"));

        assert_eq!(a.received(), vec![msg("first")]);
        assert_eq!(b.received.lock().unwrap().clone(), vec![msg("first")]);
        assert_eq!(c.received(), vec![msg("first")]);
        assert_eq!(room.len(), 2);

        room.deliver(msg("second"));
        assert_eq!(b.received.lock().unwrap().len(), 1);
        assert_eq!(a.received(), vec![msg("first"), msg("second")]);
    }
}
