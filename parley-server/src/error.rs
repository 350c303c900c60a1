use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// The room actor shut down between lookup and delivery. Retried internally.
    #[error("room is closed")]
    RoomClosed,

    #[error("participant {participant} is not enrolled in room {room}")]
    NotEnrolled { room: String, participant: String },
}
