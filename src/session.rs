use std::sync::Arc;

use anyhow::Result;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::room::{Message, Participant, ParticipantId, Room};

/// Scratch size for one read. One read's payload becomes one message.
const READ_BUF_LEN: usize = 1024;

/// Outbound queue depth per session. A peer that falls this far behind is
/// evicted from the room instead of accumulating unbounded memory.
pub const OUTBOUND_QUEUE_DEPTH: usize = 512;

/// One live connection's membership in the room. The room's membership
/// entry is the only long-lived owner; once `leave` drops it, the sender
/// half of the queue goes with it and the connection task unwinds.
pub struct Session {
    id: ParticipantId,
    room: Arc<Room>,
    outbound: mpsc::Sender<Message>
}

impl Session {
    pub fn new(room: Arc<Room>, outbound: mpsc::Sender<Message>) -> Self {
        Self {
            id: room.next_id(),
            room,
            outbound
        }
    }
}

impl Participant for Session {
    fn id(&self) -> ParticipantId {
        self.id
    }

    fn deliver(&self, msg: Message) {
        // try_send keeps the room's fan-out non-blocking. A full queue
        // means the peer cannot keep up; evicting it closes the last
        // sender and the connection winds down.
        if let Err(err) = self.outbound.try_send(msg) {
            warn!(id = self.id, "dropping slow participant: {err}");
            self.room.leave(self.id);
        }
    }
}

pub async fn handle(room: Arc<Room>, socket: TcpStream) -> Result<()> {
    let (mut reader, mut writer) = socket.into_split();

    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_DEPTH);

    let session = Arc::new(Session::new(room.clone(), tx));
    let id = session.id;

    room.join(session);

    let mut buf = [0u8; READ_BUF_LEN];

    loop {
        tokio::select! {
            // Drain path: at most one write in flight, queue order kept.
            queued = rx.recv() => {
                let Some(msg) = queued else {
                    // Evicted from the room; nothing left to drain.
                    break;
                };

                if let Err(err) = writer.write_all(&msg).await {
                    debug!(id, "write failed: {err}");
                    room.leave(id);
                    break;
                }
            }

            // Read path: every chunk becomes one broadcast.
            read = reader.read(&mut buf) => {
                match read {
                    Ok(n) if n > 0 => {
                        room.deliver(Bytes::copy_from_slice(&buf[..n]));
                        continue;
                    }
                    Ok(_) => {}
                    Err(err) => {
                        debug!(id, "read failed: {err}");
                    }
                }

                // EOF or read error ends reading only. Messages already
                // fanned out to this session still get flushed to the
                // (possibly half-closed) peer; leave() dropped the last
                // long-lived sender, so recv() runs dry once the queue
                // and any in-flight fan-out snapshots are done with it.
                room.leave(id);

                while let Some(msg) = rx.recv().await {
                    if let Err(err) = writer.write_all(&msg).await {
                        debug!(id, "write failed: {err}");
                        break;
                    }
                }

                break;
            }
        }
    }

    Ok(())
}
