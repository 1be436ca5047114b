use serde::{Deserialize, Serialize};

use crate::dao::models::RoomDocument;

pub const ROOM_PREFIX: &str = "room::";

/// Room document as stored in CouchDB, carrying the MVCC revision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub room: RoomDocument,
}

impl CouchRoomDocument {
    pub fn new(room: RoomDocument, rev: Option<String>) -> Self {
        Self {
            id: room_doc_id(&room.room_id),
            rev,
            room,
        }
    }
}

pub fn room_doc_id(room_id: &str) -> String {
    format!("{ROOM_PREFIX}{room_id}")
}
