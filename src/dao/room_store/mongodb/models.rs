use mongodb::bson::{Document, doc};
use serde::{Deserialize, Serialize};

use crate::dao::models::RoomDocument;

/// Room document as stored in the `rooms` collection, keyed by room id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(flatten)]
    pub room: RoomDocument,
}

impl From<RoomDocument> for MongoRoomDocument {
    fn from(room: RoomDocument) -> Self {
        Self {
            id: room.room_id.clone(),
            room,
        }
    }
}

pub fn room_filter(room_id: &str) -> Document {
    doc! { "_id": room_id }
}

/// Filter matching the room only while it still carries `version`.
pub fn versioned_filter(room_id: &str, version: u64) -> Document {
    doc! { "_id": room_id, "version": version as i64 }
}
