use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::dao::{
    models::{OccupantEntity, RoomEntity, RoomStatusEntity},
    room_store::couchdb::error::CouchDaoError,
};

pub const ROOM_PREFIX: &str = "room::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Acknowledgement returned by CouchDB for a successful document PUT.
#[derive(Debug, Deserialize)]
pub struct PutResponse {
    pub rev: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRoomDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub room: RoomBody,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomBody {
    pub name: String,
    pub host_id: Uuid,
    pub status: RoomStatusEntity,
    pub occupants: Vec<OccupantEntity>,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

impl From<(RoomEntity, Option<String>)> for CouchRoomDocument {
    fn from((room, rev): (RoomEntity, Option<String>)) -> Self {
        Self {
            id: room_doc_id(room.id),
            rev,
            room: RoomBody {
                name: room.name,
                host_id: room.host_id,
                status: room.status,
                occupants: room.occupants,
                created_at: room.created_at,
                updated_at: room.updated_at,
            },
        }
    }
}

impl CouchRoomDocument {
    /// Convert the document back into the shared entity model.
    pub fn try_into_entity(self) -> Result<RoomEntity, CouchDaoError> {
        let id = extract_uuid(&self.id)?;
        Ok(RoomEntity {
            id,
            name: self.room.name,
            host_id: self.room.host_id,
            status: self.room.status,
            occupants: self.room.occupants,
            created_at: self.room.created_at,
            updated_at: self.room.updated_at,
        })
    }
}

pub fn room_doc_id(id: Uuid) -> String {
    format!("{}{}", ROOM_PREFIX, id)
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let (_, id) = doc_id
        .split_once("::")
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_string(),
        kind: "invalid UUID",
    })
}
