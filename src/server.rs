//! Request dispatch: decoded wire commands routed to the store.
//!
//! The socket accept/read loop lives outside this crate; whatever owns the
//! connection hands each received message to [`handle_request`] and writes
//! the returned string back to the client. Commands outside the bulk core
//! (names, streams, metadata, migration) are answered with a structured
//! not-implemented error so outer layers can take them over.

use serde_json::json;
use tracing::debug;

use crate::error::{Error, Result};
use crate::protocol::{self, CommandType};
use crate::store::BulkStore;

/// Handle one wire message against the store and encode the reply.
///
/// Never fails: any error becomes an error reply for the client.
pub fn handle_request(store: &BulkStore, msg: &str) -> String {
    match try_handle(store, msg) {
        Ok(reply) => reply,
        Err(err) => {
            debug!(%err, "request failed");
            protocol::write_error_reply(&err)
        }
    }
}

fn try_handle(store: &BulkStore, msg: &str) -> Result<String> {
    let root = protocol::parse_message(msg)?;
    let tag = protocol::message_tag(&root)?;

    match CommandType::parse(tag) {
        CommandType::CreateBufferRequest => {
            let (size, external_id, external_size) = protocol::read_create_buffer_request(&root)?;
            let (id, payload) = match external_id {
                Some(eid) => store.create_with_external(size, eid, external_size)?,
                None => store.create(size)?,
            };
            Ok(protocol::write_create_buffer_reply(id, &payload))
        }
        CommandType::GetBuffersRequest => {
            let ids = protocol::read_get_buffers_request(&root)?;
            Ok(protocol::write_get_buffers_reply(&store.get_many(&ids)))
        }
        CommandType::GetBuffersByExternalRequest => {
            let eids = protocol::read_get_buffers_by_external_request(&root)?;
            Ok(protocol::write_get_buffers_reply(
                &store.get_by_external(&eids),
            ))
        }
        CommandType::DropBufferRequest => {
            let id = protocol::read_drop_buffer_request(&root)?;
            store.delete(id)?;
            Ok(protocol::write_drop_buffer_reply())
        }
        CommandType::ExistsRequest => {
            let id = protocol::read_exists_request(&root)?;
            Ok(protocol::write_exists_reply(store.exists(id)))
        }
        CommandType::MakeArenaRequest => {
            let size = protocol::read_make_arena_request(&root)?;
            let (fd, base) = store.make_arena(size)?;
            Ok(protocol::write_make_arena_reply(fd, size, base))
        }
        CommandType::FinalizeArenaRequest => {
            let (fd, offsets, sizes) = protocol::read_finalize_arena_request(&root)?;
            store.finalize_arena(fd, &offsets, &sizes)?;
            Ok(protocol::write_finalize_arena_reply())
        }
        CommandType::InstanceStatusRequest => {
            protocol::read_instance_status_request(&root)?;
            Ok(protocol::write_instance_status_reply(json!({
                "footprint": store.footprint(),
                "footprint_limit": store.footprint_limit(),
            })))
        }
        CommandType::NullCommand => Err(Error::Invalid(format!("unknown command `{tag}`"))),
        _ => Err(Error::NotImplemented(format!(
            "`{tag}` is handled outside the bulk store"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::ObjectId;
    use crate::protocol::{
        parse_message, read_create_buffer_reply, read_exists_reply, read_get_buffers_reply,
        read_make_arena_reply, write_create_buffer_request, write_drop_buffer_request,
        write_exists_request, write_finalize_arena_request, write_get_buffers_request,
        write_instance_status_request, write_make_arena_request, write_put_name_request,
    };

    fn reply(store: &BulkStore, msg: &str) -> serde_json::Value {
        parse_message(&handle_request(store, msg)).unwrap()
    }

    #[test]
    fn test_create_get_drop_over_the_wire() {
        let store = BulkStore::new(1024 * 1024).unwrap();

        let root = reply(&store, &write_create_buffer_request(4096, None, 0));
        let (id, created) = read_create_buffer_reply(&root).unwrap();
        assert_eq!(created.data_size, 4096);

        let root = reply(&store, &write_exists_request(id));
        assert!(read_exists_reply(&root).unwrap());

        let root = reply(&store, &write_get_buffers_request(&[id]));
        let got = read_get_buffers_reply(&root).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].object_id, id);

        let root = reply(&store, &write_drop_buffer_request(id));
        protocol::read_drop_buffer_reply(&root).unwrap();

        let root = reply(&store, &write_exists_request(id));
        assert!(!read_exists_reply(&root).unwrap());
    }

    #[test]
    fn test_drop_unknown_id_yields_error_reply() {
        let store = BulkStore::new(64 * 1024).unwrap();
        let bogus = ObjectId::from_pointer(0xdead_0000);
        let root = reply(&store, &write_drop_buffer_request(bogus));
        assert!(matches!(
            protocol::read_drop_buffer_reply(&root),
            Err(Error::ObjectNotExists(_))
        ));
    }

    #[test]
    fn test_arena_over_the_wire() {
        let store = BulkStore::new(1024 * 1024).unwrap();
        let page = rustix::param::page_size();

        let root = reply(&store, &write_make_arena_request(4 * page));
        let (fd, size, base) = read_make_arena_reply(&root).unwrap();
        assert_eq!(size, 4 * page);
        assert_ne!(base, 0);

        let root = reply(
            &store,
            &write_finalize_arena_request(fd, &[0, 2 * page], &[2 * page, 2 * page]),
        );
        protocol::read_finalize_arena_reply(&root).unwrap();

        assert!(store.exists(ObjectId::from_pointer(base)));
        assert!(store.exists(ObjectId::from_pointer(base + 2 * page)));
    }

    #[test]
    fn test_instance_status_reports_footprint() {
        let store = BulkStore::new(1024 * 1024).unwrap();
        let (_, _) = store.create(2048).unwrap();

        let root = reply(&store, &write_instance_status_request());
        let meta = protocol::read_instance_status_reply(&root).unwrap();
        assert_eq!(meta["footprint"], 2048);
        assert_eq!(meta["footprint_limit"], 1024 * 1024);
    }

    #[test]
    fn test_out_of_core_command_is_not_implemented() {
        let store = BulkStore::new(64 * 1024).unwrap();
        let root = reply(
            &store,
            &write_put_name_request(ObjectId::from_pointer(0x100), "a-name"),
        );
        assert!(matches!(
            protocol::read_put_name_reply(&root),
            Err(Error::NotImplemented(_))
        ));
    }

    #[test]
    fn test_unknown_tag_is_invalid() {
        let store = BulkStore::new(64 * 1024).unwrap();
        let root = reply(&store, r#"{"type": "frobnicate_request"}"#);
        assert!(root.get("code").is_some());
        assert!(matches!(
            protocol::read_drop_buffer_reply(&root),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_garbage_input_is_an_error_reply() {
        let store = BulkStore::new(64 * 1024).unwrap();
        let root = reply(&store, "}{ not json");
        assert!(root.get("code").is_some());
    }
}
