//! Wire protocol: JSON tagged request/reply records.
//!
//! Every message is one JSON object whose `"type"` field carries the tag.
//! Encoding is a `write_*` function producing the serialized string;
//! decoding is a `read_*` function over the parsed [`Value`] that
//! validates the tag before touching any other field. A reply may instead
//! be an error record `{"code": u32, "message": str}`; every reply reader
//! checks for that first and reconstructs the error kind.
//!
//! The surface is deliberately wide and mechanical: one pair of functions
//! per request/reply shape, nothing clever. Field layouts follow the
//! protocol exactly, including the positionally-keyed batch shapes
//! (`"0"`, `"1"`, ..., plus `"num"`) used by the buffer batch messages.

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::id::{ExternalId, ObjectId};
use crate::payload::Payload;

/// Cluster-wide instance identifier.
pub type InstanceId = u64;

/// Content-hash signature of a metadata object.
pub type Signature = u64;

// ============================================================================
// Command tags
// ============================================================================

/// Tag of an incoming command, for dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum CommandType {
    NullCommand,
    DebugCommand,
    ExitRequest,
    ExitReply,
    RegisterRequest,
    RegisterReply,
    GetDataRequest,
    GetDataReply,
    PersistRequest,
    ExistsRequest,
    DelDataRequest,
    ClusterMetaRequest,
    ListDataRequest,
    CreateBufferRequest,
    GetBuffersRequest,
    CreateDataRequest,
    PutNameRequest,
    GetNameRequest,
    DropNameRequest,
    CreateStreamRequest,
    GetNextStreamChunkRequest,
    PullNextStreamChunkRequest,
    PushNextStreamChunkRequest,
    StopStreamRequest,
    IfPersistRequest,
    InstanceStatusRequest,
    ShallowCopyRequest,
    DeepCopyRequest,
    OpenStreamRequest,
    MigrateObjectRequest,
    CreateRemoteBufferRequest,
    GetRemoteBuffersRequest,
    DropBufferRequest,
    MakeArenaRequest,
    FinalizeArenaRequest,
    ClearRequest,
    GetBuffersByExternalRequest,
    ModifyReferenceCountRequest,
    ModifyReferenceCountReply,
}

impl CommandType {
    /// Parse a tag string; unknown tags map to [`CommandType::NullCommand`].
    pub fn parse(tag: &str) -> CommandType {
        match tag {
            "debug_command" => CommandType::DebugCommand,
            "exit_request" => CommandType::ExitRequest,
            "exit_reply" => CommandType::ExitReply,
            "register_request" => CommandType::RegisterRequest,
            "register_reply" => CommandType::RegisterReply,
            "get_data_request" => CommandType::GetDataRequest,
            "get_data_reply" => CommandType::GetDataReply,
            "persist_request" => CommandType::PersistRequest,
            "exists_request" => CommandType::ExistsRequest,
            "del_data_request" => CommandType::DelDataRequest,
            "cluster_meta" => CommandType::ClusterMetaRequest,
            "list_data_request" => CommandType::ListDataRequest,
            "create_buffer_request" => CommandType::CreateBufferRequest,
            "get_buffers_request" => CommandType::GetBuffersRequest,
            "create_data_request" => CommandType::CreateDataRequest,
            "put_name_request" => CommandType::PutNameRequest,
            "get_name_request" => CommandType::GetNameRequest,
            "drop_name_request" => CommandType::DropNameRequest,
            "create_stream_request" => CommandType::CreateStreamRequest,
            "get_next_stream_chunk_request" => CommandType::GetNextStreamChunkRequest,
            "pull_next_stream_chunk_request" => CommandType::PullNextStreamChunkRequest,
            "push_next_stream_chunk_request" => CommandType::PushNextStreamChunkRequest,
            "stop_stream_request" => CommandType::StopStreamRequest,
            "if_persist_request" => CommandType::IfPersistRequest,
            "instance_status_request" => CommandType::InstanceStatusRequest,
            "shallow_copy_request" => CommandType::ShallowCopyRequest,
            "deep_copy_request" => CommandType::DeepCopyRequest,
            "open_stream_request" => CommandType::OpenStreamRequest,
            "migrate_object_request" => CommandType::MigrateObjectRequest,
            "create_remote_buffer_request" => CommandType::CreateRemoteBufferRequest,
            "get_remote_buffers_request" => CommandType::GetRemoteBuffersRequest,
            "drop_buffer_request" => CommandType::DropBufferRequest,
            "make_arena_request" => CommandType::MakeArenaRequest,
            "finalize_arena_request" => CommandType::FinalizeArenaRequest,
            "clear_request" => CommandType::ClearRequest,
            "get_buffers_by_external_request" => CommandType::GetBuffersByExternalRequest,
            "modify_reference_count_request" => CommandType::ModifyReferenceCountRequest,
            "modify_reference_count_reply" => CommandType::ModifyReferenceCountReply,
            _ => CommandType::NullCommand,
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn encode(root: Value) -> String {
    root.to_string()
}

/// Parse a wire message into a JSON tree.
pub fn parse_message(msg: &str) -> Result<Value> {
    Ok(serde_json::from_str(msg)?)
}

/// The tag of a parsed message.
pub fn message_tag(root: &Value) -> Result<&str> {
    root.get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| Error::Invalid("message has no `type` tag".into()))
}

fn expect_tag(root: &Value, tag: &str) -> Result<()> {
    if root["type"] == tag {
        Ok(())
    } else {
        Err(Error::Invalid(format!(
            "unexpected message type: expected `{tag}`, got `{}`",
            root.get("type").and_then(Value::as_str).unwrap_or("<none>")
        )))
    }
}

/// Reply preamble: surface a structured error if present, then validate
/// the tag. Runs before any field of the reply is read.
fn check_reply_error(root: &Value, tag: &str) -> Result<()> {
    if let Some(code) = root.get("code") {
        let code = code
            .as_u64()
            .ok_or_else(|| Error::Invalid("error reply `code` is not an integer".into()))?;
        if code != 0 {
            let message = root
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(Error::from_wire(code as u32, message.to_string()));
        }
    }
    expect_tag(root, tag)
}

fn field<'a>(root: &'a Value, key: &str) -> Result<&'a Value> {
    root.get(key)
        .ok_or_else(|| Error::Invalid(format!("message missing field `{key}`")))
}

fn uint_field(root: &Value, key: &str) -> Result<u64> {
    field(root, key)?
        .as_u64()
        .ok_or_else(|| Error::Invalid(format!("field `{key}` is not an unsigned integer")))
}

fn int_field(root: &Value, key: &str) -> Result<i64> {
    field(root, key)?
        .as_i64()
        .ok_or_else(|| Error::Invalid(format!("field `{key}` is not an integer")))
}

fn bool_field(root: &Value, key: &str) -> Result<bool> {
    field(root, key)?
        .as_bool()
        .ok_or_else(|| Error::Invalid(format!("field `{key}` is not a boolean")))
}

fn str_field(root: &Value, key: &str) -> Result<String> {
    Ok(field(root, key)?
        .as_str()
        .ok_or_else(|| Error::Invalid(format!("field `{key}` is not a string")))?
        .to_string())
}

fn opt_bool(root: &Value, key: &str, default: bool) -> bool {
    root.get(key).and_then(Value::as_bool).unwrap_or(default)
}

fn id_field(root: &Value, key: &str) -> Result<ObjectId> {
    Ok(ObjectId::from_u64(uint_field(root, key)?))
}

fn id_vec_field(root: &Value, key: &str) -> Result<Vec<ObjectId>> {
    field(root, key)?
        .as_array()
        .ok_or_else(|| Error::Invalid(format!("field `{key}` is not an array")))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(ObjectId::from_u64)
                .ok_or_else(|| Error::Invalid(format!("field `{key}` holds a non-integer id")))
        })
        .collect()
}

fn usize_vec_field(root: &Value, key: &str) -> Result<Vec<usize>> {
    field(root, key)?
        .as_array()
        .ok_or_else(|| Error::Invalid(format!("field `{key}` is not an array")))?
        .iter()
        .map(|v| {
            v.as_u64()
                .map(|n| n as usize)
                .ok_or_else(|| Error::Invalid(format!("field `{key}` holds a non-integer entry")))
        })
        .collect()
}

/// Read the positionally-keyed batch entries `"0"` .. `"num"-1`.
fn positional_u64s(root: &Value) -> Result<Vec<u64>> {
    let num = uint_field(root, "num")? as usize;
    let mut out = Vec::with_capacity(num);
    for i in 0..num {
        out.push(uint_field(root, &i.to_string())?);
    }
    Ok(out)
}

// ============================================================================
// Error replies
// ============================================================================

/// Encode an operation failure as an error record.
pub fn write_error_reply(err: &Error) -> String {
    encode(json!({
        "code": err.code(),
        "message": err.to_string(),
    }))
}

// ============================================================================
// Register / exit
// ============================================================================

/// Encode a register request.
pub fn write_register_request() -> String {
    encode(json!({
        "type": "register_request",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Decode a register request; a missing version reads as `0.0.0`.
pub fn read_register_request(root: &Value) -> Result<String> {
    expect_tag(root, "register_request")?;
    Ok(root
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or("0.0.0")
        .to_string())
}

/// Encode a register reply.
pub fn write_register_reply(
    ipc_socket: &str,
    rpc_endpoint: &str,
    instance_id: InstanceId,
) -> String {
    encode(json!({
        "type": "register_reply",
        "ipc_socket": ipc_socket,
        "rpc_endpoint": rpc_endpoint,
        "instance_id": instance_id,
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Decode a register reply into `(ipc_socket, rpc_endpoint, instance_id,
/// version)`.
pub fn read_register_reply(root: &Value) -> Result<(String, String, InstanceId, String)> {
    check_reply_error(root, "register_reply")?;
    Ok((
        str_field(root, "ipc_socket")?,
        str_field(root, "rpc_endpoint")?,
        uint_field(root, "instance_id")?,
        root.get("version")
            .and_then(Value::as_str)
            .unwrap_or("0.0.0")
            .to_string(),
    ))
}

/// Encode an exit request.
pub fn write_exit_request() -> String {
    encode(json!({"type": "exit_request"}))
}

// ============================================================================
// Metadata plane (consumed by outer layers)
// ============================================================================

/// Encode a get-data request for a batch of metadata objects.
pub fn write_get_data_request(ids: &[ObjectId], sync_remote: bool, wait: bool) -> String {
    encode(json!({
        "type": "get_data_request",
        "id": ids,
        "sync_remote": sync_remote,
        "wait": wait,
    }))
}

/// Decode a get-data request into `(ids, sync_remote, wait)`.
pub fn read_get_data_request(root: &Value) -> Result<(Vec<ObjectId>, bool, bool)> {
    expect_tag(root, "get_data_request")?;
    Ok((
        id_vec_field(root, "id")?,
        opt_bool(root, "sync_remote", false),
        opt_bool(root, "wait", false),
    ))
}

/// Encode a get-data reply carrying opaque metadata content.
pub fn write_get_data_reply(content: Value) -> String {
    encode(json!({
        "type": "get_data_reply",
        "content": content,
    }))
}

/// Decode a get-data reply into its metadata content.
pub fn read_get_data_reply(root: &Value) -> Result<Value> {
    check_reply_error(root, "get_data_reply")?;
    Ok(field(root, "content")?.clone())
}

/// Encode a list-data request.
pub fn write_list_data_request(pattern: &str, regex: bool, limit: usize) -> String {
    encode(json!({
        "type": "list_data_request",
        "pattern": pattern,
        "regex": regex,
        "limit": limit,
    }))
}

/// Decode a list-data request into `(pattern, regex, limit)`.
pub fn read_list_data_request(root: &Value) -> Result<(String, bool, usize)> {
    expect_tag(root, "list_data_request")?;
    Ok((
        str_field(root, "pattern")?,
        opt_bool(root, "regex", false),
        uint_field(root, "limit")? as usize,
    ))
}

/// Encode a create-data request carrying opaque metadata content.
pub fn write_create_data_request(content: Value) -> String {
    encode(json!({
        "type": "create_data_request",
        "content": content,
    }))
}

/// Decode a create-data request into its metadata content.
pub fn read_create_data_request(root: &Value) -> Result<Value> {
    expect_tag(root, "create_data_request")?;
    Ok(field(root, "content")?.clone())
}

/// Encode a create-data reply.
pub fn write_create_data_reply(
    id: ObjectId,
    signature: Signature,
    instance_id: InstanceId,
) -> String {
    encode(json!({
        "type": "create_data_reply",
        "id": id,
        "signature": signature,
        "instance_id": instance_id,
    }))
}

/// Decode a create-data reply into `(id, signature, instance_id)`.
pub fn read_create_data_reply(root: &Value) -> Result<(ObjectId, Signature, InstanceId)> {
    check_reply_error(root, "create_data_reply")?;
    Ok((
        id_field(root, "id")?,
        uint_field(root, "signature")?,
        uint_field(root, "instance_id")?,
    ))
}

/// Encode a persist request.
pub fn write_persist_request(id: ObjectId) -> String {
    encode(json!({"type": "persist_request", "id": id}))
}

/// Decode a persist request.
pub fn read_persist_request(root: &Value) -> Result<ObjectId> {
    expect_tag(root, "persist_request")?;
    id_field(root, "id")
}

/// Encode an empty persist reply.
pub fn write_persist_reply() -> String {
    encode(json!({"type": "persist_reply"}))
}

/// Decode a persist reply.
pub fn read_persist_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "persist_reply")
}

/// Encode an if-persist request.
pub fn write_if_persist_request(id: ObjectId) -> String {
    encode(json!({"type": "if_persist_request", "id": id}))
}

/// Decode an if-persist request.
pub fn read_if_persist_request(root: &Value) -> Result<ObjectId> {
    expect_tag(root, "if_persist_request")?;
    id_field(root, "id")
}

/// Encode an if-persist reply.
pub fn write_if_persist_reply(persist: bool) -> String {
    encode(json!({"type": "if_persist_reply", "persist": persist}))
}

/// Decode an if-persist reply.
pub fn read_if_persist_reply(root: &Value) -> Result<bool> {
    check_reply_error(root, "if_persist_reply")?;
    Ok(opt_bool(root, "persist", false))
}

/// Encode an exists request.
pub fn write_exists_request(id: ObjectId) -> String {
    encode(json!({"type": "exists_request", "id": id}))
}

/// Decode an exists request.
pub fn read_exists_request(root: &Value) -> Result<ObjectId> {
    expect_tag(root, "exists_request")?;
    id_field(root, "id")
}

/// Encode an exists reply.
pub fn write_exists_reply(exists: bool) -> String {
    encode(json!({"type": "exists_reply", "exists": exists}))
}

/// Decode an exists reply.
pub fn read_exists_reply(root: &Value) -> Result<bool> {
    check_reply_error(root, "exists_reply")?;
    Ok(opt_bool(root, "exists", false))
}

/// Encode a del-data request for a batch of metadata objects.
pub fn write_del_data_request(ids: &[ObjectId], force: bool, deep: bool, fastpath: bool) -> String {
    encode(json!({
        "type": "del_data_request",
        "id": ids,
        "force": force,
        "deep": deep,
        "fastpath": fastpath,
    }))
}

/// Decode a del-data request into `(ids, force, deep, fastpath)`.
pub fn read_del_data_request(root: &Value) -> Result<(Vec<ObjectId>, bool, bool, bool)> {
    expect_tag(root, "del_data_request")?;
    Ok((
        id_vec_field(root, "id")?,
        opt_bool(root, "force", false),
        opt_bool(root, "deep", false),
        opt_bool(root, "fastpath", false),
    ))
}

/// Encode an empty del-data reply.
pub fn write_del_data_reply() -> String {
    encode(json!({"type": "del_data_reply"}))
}

/// Decode a del-data reply.
pub fn read_del_data_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "del_data_reply")
}

/// Encode a cluster-meta request.
pub fn write_cluster_meta_request() -> String {
    encode(json!({"type": "cluster_meta"}))
}

/// Decode a cluster-meta request.
pub fn read_cluster_meta_request(root: &Value) -> Result<()> {
    expect_tag(root, "cluster_meta")
}

/// Encode a cluster-meta reply carrying the gossip tree.
pub fn write_cluster_meta_reply(meta: Value) -> String {
    encode(json!({"type": "cluster_meta", "meta": meta}))
}

/// Decode a cluster-meta reply into the gossip tree.
pub fn read_cluster_meta_reply(root: &Value) -> Result<Value> {
    check_reply_error(root, "cluster_meta")?;
    Ok(field(root, "meta")?.clone())
}

/// Encode an instance-status request.
pub fn write_instance_status_request() -> String {
    encode(json!({"type": "instance_status_request"}))
}

/// Decode an instance-status request.
pub fn read_instance_status_request(root: &Value) -> Result<()> {
    expect_tag(root, "instance_status_request")
}

/// Encode an instance-status reply.
pub fn write_instance_status_reply(meta: Value) -> String {
    encode(json!({"type": "instance_status_reply", "meta": meta}))
}

/// Decode an instance-status reply.
pub fn read_instance_status_reply(root: &Value) -> Result<Value> {
    check_reply_error(root, "instance_status_reply")?;
    Ok(field(root, "meta")?.clone())
}

// ============================================================================
// Buffer plane (consumed by the bulk store)
// ============================================================================

/// Encode a create-buffer request.
pub fn write_create_buffer_request(
    size: usize,
    external_id: Option<&str>,
    external_size: usize,
) -> String {
    encode(json!({
        "type": "create_buffer_request",
        "size": size,
        "external_id": external_id.unwrap_or(""),
        "external_size": external_size,
    }))
}

/// Decode a create-buffer request into `(size, external_id,
/// external_size)`.
pub fn read_create_buffer_request(root: &Value) -> Result<(usize, Option<ExternalId>, usize)> {
    expect_tag(root, "create_buffer_request")?;
    let external_id = str_field(root, "external_id")?;
    Ok((
        uint_field(root, "size")? as usize,
        (!external_id.is_empty()).then_some(external_id),
        uint_field(root, "external_size")? as usize,
    ))
}

/// Encode a create-buffer reply with the new blob's descriptor.
pub fn write_create_buffer_reply(id: ObjectId, payload: &Payload) -> String {
    encode(json!({
        "type": "create_buffer_reply",
        "id": id,
        "created": payload.to_wire(),
    }))
}

/// Decode a create-buffer reply into `(id, payload)`.
pub fn read_create_buffer_reply(root: &Value) -> Result<(ObjectId, Payload)> {
    check_reply_error(root, "create_buffer_reply")?;
    Ok((
        id_field(root, "id")?,
        Payload::from_wire(field(root, "created")?)?,
    ))
}

/// Encode a create-remote-buffer request.
pub fn write_create_remote_buffer_request(size: usize) -> String {
    encode(json!({"type": "create_remote_buffer_request", "size": size}))
}

/// Decode a create-remote-buffer request.
pub fn read_create_remote_buffer_request(root: &Value) -> Result<usize> {
    expect_tag(root, "create_remote_buffer_request")?;
    Ok(uint_field(root, "size")? as usize)
}

/// Encode a get-buffers request (positional id keys plus `num`).
pub fn write_get_buffers_request(ids: &[ObjectId]) -> String {
    let mut root = json!({"type": "get_buffers_request", "num": ids.len()});
    for (idx, id) in ids.iter().enumerate() {
        root[idx.to_string()] = json!(id);
    }
    encode(root)
}

/// Decode a get-buffers request into the requested ids.
pub fn read_get_buffers_request(root: &Value) -> Result<Vec<ObjectId>> {
    expect_tag(root, "get_buffers_request")?;
    Ok(positional_u64s(root)?
        .into_iter()
        .map(ObjectId::from_u64)
        .collect())
}

/// Encode a get-buffers-by-external request (positional keys plus `num`).
pub fn write_get_buffers_by_external_request(external_ids: &[ExternalId]) -> String {
    let mut root = json!({"type": "get_buffers_by_external_request", "num": external_ids.len()});
    for (idx, eid) in external_ids.iter().enumerate() {
        root[idx.to_string()] = json!(eid);
    }
    encode(root)
}

/// Decode a get-buffers-by-external request into the requested keys.
pub fn read_get_buffers_by_external_request(root: &Value) -> Result<Vec<ExternalId>> {
    expect_tag(root, "get_buffers_by_external_request")?;
    let num = uint_field(root, "num")? as usize;
    let mut out = Vec::with_capacity(num);
    for i in 0..num {
        out.push(str_field(root, &i.to_string())?);
    }
    Ok(out)
}

/// Encode a get-remote-buffers request (positional id keys plus `num`).
pub fn write_get_remote_buffers_request(ids: &[ObjectId]) -> String {
    let mut root = json!({"type": "get_remote_buffers_request", "num": ids.len()});
    for (idx, id) in ids.iter().enumerate() {
        root[idx.to_string()] = json!(id);
    }
    encode(root)
}

/// Decode a get-remote-buffers request into the requested ids.
pub fn read_get_remote_buffers_request(root: &Value) -> Result<Vec<ObjectId>> {
    expect_tag(root, "get_remote_buffers_request")?;
    Ok(positional_u64s(root)?
        .into_iter()
        .map(ObjectId::from_u64)
        .collect())
}

/// Encode a get-buffers reply: `num` positionally-indexed descriptors.
///
/// Response order is not guaranteed to match the request; consumers match
/// descriptors by their `object_id` field.
pub fn write_get_buffers_reply(payloads: &[std::sync::Arc<Payload>]) -> String {
    let mut root = json!({"type": "get_buffers_reply", "num": payloads.len()});
    for (idx, payload) in payloads.iter().enumerate() {
        root[idx.to_string()] = payload.to_wire();
    }
    encode(root)
}

/// Decode a get-buffers reply into its payload descriptors.
pub fn read_get_buffers_reply(root: &Value) -> Result<Vec<Payload>> {
    check_reply_error(root, "get_buffers_reply")?;
    let num = uint_field(root, "num")? as usize;
    let mut out = Vec::with_capacity(num);
    for i in 0..num {
        out.push(Payload::from_wire(field(root, &i.to_string())?)?);
    }
    Ok(out)
}

/// Encode a drop-buffer request.
pub fn write_drop_buffer_request(id: ObjectId) -> String {
    encode(json!({"type": "drop_buffer_request", "id": id}))
}

/// Decode a drop-buffer request.
pub fn read_drop_buffer_request(root: &Value) -> Result<ObjectId> {
    expect_tag(root, "drop_buffer_request")?;
    id_field(root, "id")
}

/// Encode an empty drop-buffer reply.
pub fn write_drop_buffer_reply() -> String {
    encode(json!({"type": "drop_buffer_reply"}))
}

/// Decode a drop-buffer reply.
pub fn read_drop_buffer_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "drop_buffer_reply")
}

// ============================================================================
// Arenas
// ============================================================================

/// Encode a make-arena request.
pub fn write_make_arena_request(size: usize) -> String {
    encode(json!({"type": "make_arena_request", "size": size}))
}

/// Decode a make-arena request.
pub fn read_make_arena_request(root: &Value) -> Result<usize> {
    expect_tag(root, "make_arena_request")?;
    Ok(uint_field(root, "size")? as usize)
}

/// Encode a make-arena reply.
///
/// The fd is meaningful only within the server's descriptor namespace;
/// clients receive the real descriptor out-of-band (`SCM_RIGHTS`).
pub fn write_make_arena_reply(fd: i32, size: usize, base: usize) -> String {
    encode(json!({
        "type": "make_arena_reply",
        "fd": fd,
        "size": size,
        "base": base,
    }))
}

/// Decode a make-arena reply into `(fd, size, base)`.
pub fn read_make_arena_reply(root: &Value) -> Result<(i32, usize, usize)> {
    check_reply_error(root, "make_arena_reply")?;
    Ok((
        int_field(root, "fd")? as i32,
        uint_field(root, "size")? as usize,
        uint_field(root, "base")? as usize,
    ))
}

/// Encode a finalize-arena request.
pub fn write_finalize_arena_request(fd: i32, offsets: &[usize], sizes: &[usize]) -> String {
    encode(json!({
        "type": "finalize_arena_request",
        "fd": fd,
        "offsets": offsets,
        "sizes": sizes,
    }))
}

/// Decode a finalize-arena request into `(fd, offsets, sizes)`.
pub fn read_finalize_arena_request(root: &Value) -> Result<(i32, Vec<usize>, Vec<usize>)> {
    expect_tag(root, "finalize_arena_request")?;
    Ok((
        int_field(root, "fd")? as i32,
        usize_vec_field(root, "offsets")?,
        usize_vec_field(root, "sizes")?,
    ))
}

/// Encode an empty finalize-arena reply.
pub fn write_finalize_arena_reply() -> String {
    encode(json!({"type": "finalize_arena_reply"}))
}

/// Decode a finalize-arena reply.
pub fn read_finalize_arena_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "finalize_arena_reply")
}

// ============================================================================
// Names
// ============================================================================

/// Encode a put-name request.
pub fn write_put_name_request(object_id: ObjectId, name: &str) -> String {
    encode(json!({
        "type": "put_name_request",
        "object_id": object_id,
        "name": name,
    }))
}

/// Decode a put-name request into `(object_id, name)`.
pub fn read_put_name_request(root: &Value) -> Result<(ObjectId, String)> {
    expect_tag(root, "put_name_request")?;
    Ok((id_field(root, "object_id")?, str_field(root, "name")?))
}

/// Encode an empty put-name reply.
pub fn write_put_name_reply() -> String {
    encode(json!({"type": "put_name_reply"}))
}

/// Decode a put-name reply.
pub fn read_put_name_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "put_name_reply")
}

/// Encode a get-name request.
pub fn write_get_name_request(name: &str, wait: bool) -> String {
    encode(json!({"type": "get_name_request", "name": name, "wait": wait}))
}

/// Decode a get-name request into `(name, wait)`.
pub fn read_get_name_request(root: &Value) -> Result<(String, bool)> {
    expect_tag(root, "get_name_request")?;
    Ok((str_field(root, "name")?, bool_field(root, "wait")?))
}

/// Encode a get-name reply.
pub fn write_get_name_reply(object_id: ObjectId) -> String {
    encode(json!({"type": "get_name_reply", "object_id": object_id}))
}

/// Decode a get-name reply.
pub fn read_get_name_reply(root: &Value) -> Result<ObjectId> {
    check_reply_error(root, "get_name_reply")?;
    id_field(root, "object_id")
}

/// Encode a drop-name request.
pub fn write_drop_name_request(name: &str) -> String {
    encode(json!({"type": "drop_name_request", "name": name}))
}

/// Decode a drop-name request.
pub fn read_drop_name_request(root: &Value) -> Result<String> {
    expect_tag(root, "drop_name_request")?;
    str_field(root, "name")
}

/// Encode an empty drop-name reply.
pub fn write_drop_name_reply() -> String {
    encode(json!({"type": "drop_name_reply"}))
}

/// Decode a drop-name reply.
pub fn read_drop_name_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "drop_name_reply")
}

// ============================================================================
// Streams
// ============================================================================

/// Encode a create-stream request.
pub fn write_create_stream_request(object_id: ObjectId) -> String {
    encode(json!({"type": "create_stream_request", "object_id": object_id}))
}

/// Decode a create-stream request.
pub fn read_create_stream_request(root: &Value) -> Result<ObjectId> {
    expect_tag(root, "create_stream_request")?;
    id_field(root, "object_id")
}

/// Encode an empty create-stream reply.
pub fn write_create_stream_reply() -> String {
    encode(json!({"type": "create_stream_reply"}))
}

/// Decode a create-stream reply.
pub fn read_create_stream_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "create_stream_reply")
}

/// Encode an open-stream request.
pub fn write_open_stream_request(object_id: ObjectId, mode: i64) -> String {
    encode(json!({
        "type": "open_stream_request",
        "object_id": object_id,
        "mode": mode,
    }))
}

/// Decode an open-stream request into `(object_id, mode)`.
pub fn read_open_stream_request(root: &Value) -> Result<(ObjectId, i64)> {
    expect_tag(root, "open_stream_request")?;
    Ok((id_field(root, "object_id")?, int_field(root, "mode")?))
}

/// Encode an empty open-stream reply.
pub fn write_open_stream_reply() -> String {
    encode(json!({"type": "open_stream_reply"}))
}

/// Decode an open-stream reply.
pub fn read_open_stream_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "open_stream_reply")
}

/// Encode a get-next-stream-chunk request.
pub fn write_get_next_stream_chunk_request(stream_id: ObjectId, size: usize) -> String {
    encode(json!({
        "type": "get_next_stream_chunk_request",
        "id": stream_id,
        "size": size,
    }))
}

/// Decode a get-next-stream-chunk request into `(stream_id, size)`.
pub fn read_get_next_stream_chunk_request(root: &Value) -> Result<(ObjectId, usize)> {
    expect_tag(root, "get_next_stream_chunk_request")?;
    Ok((id_field(root, "id")?, uint_field(root, "size")? as usize))
}

/// Encode a get-next-stream-chunk reply with the chunk's descriptor.
pub fn write_get_next_stream_chunk_reply(payload: &Payload) -> String {
    encode(json!({
        "type": "get_next_stream_chunk_reply",
        "buffer": payload.to_wire(),
    }))
}

/// Decode a get-next-stream-chunk reply into the chunk's descriptor.
pub fn read_get_next_stream_chunk_reply(root: &Value) -> Result<Payload> {
    check_reply_error(root, "get_next_stream_chunk_reply")?;
    Payload::from_wire(field(root, "buffer")?)
}

/// Encode a push-next-stream-chunk request.
pub fn write_push_next_stream_chunk_request(stream_id: ObjectId, chunk: ObjectId) -> String {
    encode(json!({
        "type": "push_next_stream_chunk_request",
        "id": stream_id,
        "chunk": chunk,
    }))
}

/// Decode a push-next-stream-chunk request into `(stream_id, chunk)`.
pub fn read_push_next_stream_chunk_request(root: &Value) -> Result<(ObjectId, ObjectId)> {
    expect_tag(root, "push_next_stream_chunk_request")?;
    Ok((id_field(root, "id")?, id_field(root, "chunk")?))
}

/// Encode an empty push-next-stream-chunk reply.
pub fn write_push_next_stream_chunk_reply() -> String {
    encode(json!({"type": "push_next_stream_chunk_reply"}))
}

/// Decode a push-next-stream-chunk reply.
pub fn read_push_next_stream_chunk_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "push_next_stream_chunk_reply")
}

/// Encode a pull-next-stream-chunk request.
pub fn write_pull_next_stream_chunk_request(stream_id: ObjectId) -> String {
    encode(json!({"type": "pull_next_stream_chunk_request", "id": stream_id}))
}

/// Decode a pull-next-stream-chunk request.
pub fn read_pull_next_stream_chunk_request(root: &Value) -> Result<ObjectId> {
    expect_tag(root, "pull_next_stream_chunk_request")?;
    id_field(root, "id")
}

/// Encode a pull-next-stream-chunk reply.
pub fn write_pull_next_stream_chunk_reply(chunk: ObjectId) -> String {
    encode(json!({"type": "pull_next_stream_chunk_reply", "chunk": chunk}))
}

/// Decode a pull-next-stream-chunk reply.
pub fn read_pull_next_stream_chunk_reply(root: &Value) -> Result<ObjectId> {
    check_reply_error(root, "pull_next_stream_chunk_reply")?;
    id_field(root, "chunk")
}

/// Encode a stop-stream request.
pub fn write_stop_stream_request(stream_id: ObjectId, failed: bool) -> String {
    encode(json!({
        "type": "stop_stream_request",
        "id": stream_id,
        "failed": failed,
    }))
}

/// Decode a stop-stream request into `(stream_id, failed)`.
pub fn read_stop_stream_request(root: &Value) -> Result<(ObjectId, bool)> {
    expect_tag(root, "stop_stream_request")?;
    Ok((id_field(root, "id")?, bool_field(root, "failed")?))
}

/// Encode an empty stop-stream reply.
pub fn write_stop_stream_reply() -> String {
    encode(json!({"type": "stop_stream_reply"}))
}

/// Decode a stop-stream reply.
pub fn read_stop_stream_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "stop_stream_reply")
}

// ============================================================================
// Copies and migration (consumed by outer layers)
// ============================================================================

/// Encode a shallow-copy request with optional extra metadata.
pub fn write_shallow_copy_request(id: ObjectId, extra_metadata: Option<Value>) -> String {
    let mut root = json!({"type": "shallow_copy_request", "id": id});
    if let Some(extra) = extra_metadata {
        root["extra"] = extra;
    }
    encode(root)
}

/// Decode a shallow-copy request into `(id, extra_metadata)`.
pub fn read_shallow_copy_request(root: &Value) -> Result<(ObjectId, Value)> {
    expect_tag(root, "shallow_copy_request")?;
    Ok((
        id_field(root, "id")?,
        root.get("extra").cloned().unwrap_or_else(|| json!({})),
    ))
}

/// Encode a shallow-copy reply.
pub fn write_shallow_copy_reply(target_id: ObjectId) -> String {
    encode(json!({"type": "shallow_copy_reply", "target_id": target_id}))
}

/// Decode a shallow-copy reply.
pub fn read_shallow_copy_reply(root: &Value) -> Result<ObjectId> {
    check_reply_error(root, "shallow_copy_reply")?;
    id_field(root, "target_id")
}

/// Encode a deep-copy request.
pub fn write_deep_copy_request(object_id: ObjectId, peer: &str, peer_rpc_endpoint: &str) -> String {
    encode(json!({
        "type": "deep_copy_request",
        "object_id": object_id,
        "peer": peer,
        "peer_rpc_endpoint": peer_rpc_endpoint,
    }))
}

/// Decode a deep-copy request into `(object_id, peer, peer_rpc_endpoint)`.
pub fn read_deep_copy_request(root: &Value) -> Result<(ObjectId, String, String)> {
    expect_tag(root, "deep_copy_request")?;
    Ok((
        id_field(root, "object_id")?,
        str_field(root, "peer")?,
        str_field(root, "peer_rpc_endpoint")?,
    ))
}

/// Encode a deep-copy reply.
pub fn write_deep_copy_reply(object_id: ObjectId) -> String {
    encode(json!({"type": "deep_copy_reply", "object_id": object_id}))
}

/// Decode a deep-copy reply.
pub fn read_deep_copy_reply(root: &Value) -> Result<ObjectId> {
    check_reply_error(root, "deep_copy_reply")?;
    id_field(root, "object_id")
}

/// Encode a migrate-object request.
pub fn write_migrate_object_request(
    object_id: ObjectId,
    local: bool,
    is_stream: bool,
    peer: &str,
    peer_rpc_endpoint: &str,
) -> String {
    encode(json!({
        "type": "migrate_object_request",
        "object_id": object_id,
        "local": local,
        "is_stream": is_stream,
        "peer": peer,
        "peer_rpc_endpoint": peer_rpc_endpoint,
    }))
}

/// Decode a migrate-object request into `(object_id, local, is_stream,
/// peer, peer_rpc_endpoint)`.
pub fn read_migrate_object_request(
    root: &Value,
) -> Result<(ObjectId, bool, bool, String, String)> {
    expect_tag(root, "migrate_object_request")?;
    Ok((
        id_field(root, "object_id")?,
        bool_field(root, "local")?,
        bool_field(root, "is_stream")?,
        str_field(root, "peer")?,
        str_field(root, "peer_rpc_endpoint")?,
    ))
}

/// Encode a migrate-object reply.
pub fn write_migrate_object_reply(object_id: ObjectId) -> String {
    encode(json!({"type": "migrate_object_reply", "object_id": object_id}))
}

/// Decode a migrate-object reply.
pub fn read_migrate_object_reply(root: &Value) -> Result<ObjectId> {
    check_reply_error(root, "migrate_object_reply")?;
    id_field(root, "object_id")
}

// ============================================================================
// Maintenance
// ============================================================================

/// Encode a clear request.
pub fn write_clear_request() -> String {
    encode(json!({"type": "clear_request"}))
}

/// Decode a clear request.
pub fn read_clear_request(root: &Value) -> Result<()> {
    expect_tag(root, "clear_request")
}

/// Encode an empty clear reply.
pub fn write_clear_reply() -> String {
    encode(json!({"type": "clear_reply"}))
}

/// Decode a clear reply.
pub fn read_clear_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "clear_reply")
}

/// Encode a debug command carrying an opaque payload.
pub fn write_debug_request(debug: Value) -> String {
    encode(json!({"type": "debug_command", "debug": debug}))
}

/// Decode a debug command into its payload.
pub fn read_debug_request(root: &Value) -> Result<Value> {
    expect_tag(root, "debug_command")?;
    Ok(field(root, "debug")?.clone())
}

/// Encode a debug reply carrying an opaque result.
pub fn write_debug_reply(result: Value) -> String {
    encode(json!({"type": "debug_reply", "result": result}))
}

/// Decode a debug reply into its result.
pub fn read_debug_reply(root: &Value) -> Result<Value> {
    check_reply_error(root, "debug_reply")?;
    Ok(field(root, "result")?.clone())
}

/// Encode a modify-reference-count request.
pub fn write_modify_reference_count_request(external_id: &str, changes: i64) -> String {
    encode(json!({
        "type": "modify_reference_count_request",
        "external_id": external_id,
        "changes": changes,
    }))
}

/// Decode a modify-reference-count request into `(external_id, changes)`.
pub fn read_modify_reference_count_request(root: &Value) -> Result<(ExternalId, i64)> {
    expect_tag(root, "modify_reference_count_request")?;
    Ok((str_field(root, "external_id")?, int_field(root, "changes")?))
}

/// Encode an empty modify-reference-count reply.
pub fn write_modify_reference_count_reply() -> String {
    encode(json!({"type": "modify_reference_count_reply"}))
}

/// Decode a modify-reference-count reply.
pub fn read_modify_reference_count_reply(root: &Value) -> Result<()> {
    check_reply_error(root, "modify_reference_count_reply")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn parsed(msg: &str) -> Value {
        parse_message(msg).unwrap()
    }

    #[test]
    fn test_command_type_parse() {
        assert_eq!(
            CommandType::parse("create_buffer_request"),
            CommandType::CreateBufferRequest
        );
        assert_eq!(
            CommandType::parse("finalize_arena_request"),
            CommandType::FinalizeArenaRequest
        );
        assert_eq!(CommandType::parse("no_such_tag"), CommandType::NullCommand);
    }

    #[test]
    fn test_register_round_trip() {
        let root = parsed(&write_register_request());
        assert_eq!(read_register_request(&root).unwrap(), env!("CARGO_PKG_VERSION"));

        let root = parsed(&write_register_reply("/tmp/shm.sock", "0.0.0.0:9600", 3));
        let (socket, endpoint, instance, version) = read_register_reply(&root).unwrap();
        assert_eq!(socket, "/tmp/shm.sock");
        assert_eq!(endpoint, "0.0.0.0:9600");
        assert_eq!(instance, 3);
        assert_eq!(version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_create_buffer_round_trip() {
        let root = parsed(&write_create_buffer_request(4096, Some("part-1"), 4096));
        let (size, eid, esize) = read_create_buffer_request(&root).unwrap();
        assert_eq!(size, 4096);
        assert_eq!(eid.as_deref(), Some("part-1"));
        assert_eq!(esize, 4096);

        // Absent external id travels as the empty string.
        let root = parsed(&write_create_buffer_request(64, None, 0));
        let (_, eid, _) = read_create_buffer_request(&root).unwrap();
        assert_eq!(eid, None);
    }

    #[test]
    fn test_create_buffer_reply_round_trip() {
        let id = ObjectId::from_pointer(0x7f00_0000_4000);
        let payload = Payload::new(id, 4096, std::ptr::null_mut(), 7, 1 << 20, 0x4000);
        let root = parsed(&write_create_buffer_reply(id, &payload));
        let (got_id, got) = read_create_buffer_reply(&root).unwrap();
        assert_eq!(got_id, id);
        assert_eq!(got, payload);
    }

    #[test]
    fn test_get_buffers_positional_round_trip() {
        let ids = vec![
            ObjectId::from_pointer(0x1000),
            ObjectId::from_pointer(0x2000),
            ObjectId::from_pointer(0x3000),
        ];
        let root = parsed(&write_get_buffers_request(&ids));
        assert_eq!(read_get_buffers_request(&root).unwrap(), ids);

        let payloads: Vec<Arc<Payload>> = ids
            .iter()
            .map(|&id| {
                Arc::new(Payload::new(
                    id,
                    128,
                    std::ptr::null_mut(),
                    5,
                    1 << 16,
                    id.as_u64() as usize & 0xffff,
                ))
            })
            .collect();
        let root = parsed(&write_get_buffers_reply(&payloads));
        let got = read_get_buffers_reply(&root).unwrap();
        assert_eq!(got.len(), 3);
        for (decoded, original) in got.iter().zip(&payloads) {
            assert_eq!(decoded, original.as_ref());
        }
    }

    #[test]
    fn test_get_buffers_by_external_round_trip() {
        let eids = vec!["alpha".to_string(), "beta".to_string()];
        let root = parsed(&write_get_buffers_by_external_request(&eids));
        assert_eq!(read_get_buffers_by_external_request(&root).unwrap(), eids);
    }

    #[test]
    fn test_arena_round_trips() {
        let root = parsed(&write_make_arena_request(1 << 20));
        assert_eq!(read_make_arena_request(&root).unwrap(), 1 << 20);

        let root = parsed(&write_make_arena_reply(11, 1 << 20, 0x7f00_2000_0000));
        assert_eq!(
            read_make_arena_reply(&root).unwrap(),
            (11, 1 << 20, 0x7f00_2000_0000)
        );

        let root = parsed(&write_finalize_arena_request(11, &[0, 4096], &[4096, 512]));
        let (fd, offsets, sizes) = read_finalize_arena_request(&root).unwrap();
        assert_eq!(fd, 11);
        assert_eq!(offsets, vec![0, 4096]);
        assert_eq!(sizes, vec![4096, 512]);

        let root = parsed(&write_finalize_arena_reply());
        read_finalize_arena_reply(&root).unwrap();
    }

    #[test]
    fn test_drop_buffer_round_trip() {
        let id = ObjectId::from_pointer(0xbeef_0000);
        let root = parsed(&write_drop_buffer_request(id));
        assert_eq!(read_drop_buffer_request(&root).unwrap(), id);
        read_drop_buffer_reply(&parsed(&write_drop_buffer_reply())).unwrap();
    }

    #[test]
    fn test_name_round_trips() {
        let id = ObjectId::from_pointer(0xf00d_0000);
        let root = parsed(&write_put_name_request(id, "training/batch-7"));
        assert_eq!(
            read_put_name_request(&root).unwrap(),
            (id, "training/batch-7".to_string())
        );

        let root = parsed(&write_get_name_request("training/batch-7", true));
        assert_eq!(
            read_get_name_request(&root).unwrap(),
            ("training/batch-7".to_string(), true)
        );

        let root = parsed(&write_get_name_reply(id));
        assert_eq!(read_get_name_reply(&root).unwrap(), id);

        let root = parsed(&write_drop_name_request("training/batch-7"));
        assert_eq!(read_drop_name_request(&root).unwrap(), "training/batch-7");
    }

    #[test]
    fn test_stream_round_trips() {
        let stream = ObjectId::from_pointer(0xaaaa_0000);
        let chunk = ObjectId::from_pointer(0xbbbb_0000);

        let root = parsed(&write_get_next_stream_chunk_request(stream, 8192));
        assert_eq!(
            read_get_next_stream_chunk_request(&root).unwrap(),
            (stream, 8192)
        );

        let payload = Payload::new(chunk, 8192, std::ptr::null_mut(), 4, 1 << 20, 0);
        let root = parsed(&write_get_next_stream_chunk_reply(&payload));
        assert_eq!(read_get_next_stream_chunk_reply(&root).unwrap(), payload);

        let root = parsed(&write_push_next_stream_chunk_request(stream, chunk));
        assert_eq!(
            read_push_next_stream_chunk_request(&root).unwrap(),
            (stream, chunk)
        );

        let root = parsed(&write_pull_next_stream_chunk_reply(chunk));
        assert_eq!(read_pull_next_stream_chunk_reply(&root).unwrap(), chunk);

        let root = parsed(&write_stop_stream_request(stream, false));
        assert_eq!(read_stop_stream_request(&root).unwrap(), (stream, false));
    }

    #[test]
    fn test_metadata_round_trips() {
        let ids = vec![ObjectId::from_pointer(0x1111), ObjectId::from_pointer(0x2222)];
        let root = parsed(&write_get_data_request(&ids, true, false));
        assert_eq!(read_get_data_request(&root).unwrap(), (ids.clone(), true, false));

        let root = parsed(&write_del_data_request(&ids, false, true, false));
        let (got, force, deep, fastpath) = read_del_data_request(&root).unwrap();
        assert_eq!(got, ids);
        assert!(!force && deep && !fastpath);

        let root = parsed(&write_list_data_request("batch-*", false, 100));
        assert_eq!(
            read_list_data_request(&root).unwrap(),
            ("batch-*".to_string(), false, 100)
        );

        let content = json!({"typename": "Tensor", "shape": [64, 64]});
        let root = parsed(&write_create_data_request(content.clone()));
        assert_eq!(read_create_data_request(&root).unwrap(), content);

        let root = parsed(&write_create_data_reply(ids[0], 0xfeed, 2));
        assert_eq!(read_create_data_reply(&root).unwrap(), (ids[0], 0xfeed, 2));
    }

    #[test]
    fn test_migration_round_trips() {
        let id = ObjectId::from_pointer(0x3333);
        let root = parsed(&write_migrate_object_request(
            id, true, false, "node-2", "node-2:9600",
        ));
        assert_eq!(
            read_migrate_object_request(&root).unwrap(),
            (id, true, false, "node-2".to_string(), "node-2:9600".to_string())
        );

        let root = parsed(&write_shallow_copy_request(id, Some(json!({"k": "v"}))));
        let (got, extra) = read_shallow_copy_request(&root).unwrap();
        assert_eq!(got, id);
        assert_eq!(extra, json!({"k": "v"}));

        // Extra metadata is optional and defaults to an empty object.
        let root = parsed(&write_shallow_copy_request(id, None));
        let (_, extra) = read_shallow_copy_request(&root).unwrap();
        assert_eq!(extra, json!({}));

        let root = parsed(&write_deep_copy_request(id, "node-3", "node-3:9600"));
        assert_eq!(
            read_deep_copy_request(&root).unwrap(),
            (id, "node-3".to_string(), "node-3:9600".to_string())
        );
    }

    #[test]
    fn test_tag_mismatch_is_invalid_before_fields() {
        // A well-formed exists reply fed to the drop-buffer reader must be
        // rejected on the tag alone.
        let root = parsed(&write_exists_reply(true));
        assert!(matches!(
            read_drop_buffer_reply(&root),
            Err(Error::Invalid(_))
        ));

        // Requests too.
        let root = parsed(&write_drop_buffer_request(ObjectId::EMPTY));
        assert!(matches!(
            read_exists_request(&root),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_error_reply_short_circuits() {
        let err = Error::ObjectNotExists("get: id = o42".into());
        let root = parsed(&write_error_reply(&err));

        // Every reply reader must surface the error before tag checking.
        assert!(matches!(
            read_create_buffer_reply(&root),
            Err(Error::ObjectNotExists(_))
        ));
        assert!(matches!(
            read_get_buffers_reply(&root),
            Err(Error::ObjectNotExists(_))
        ));
        assert!(matches!(
            read_finalize_arena_reply(&root),
            Err(Error::ObjectNotExists(_))
        ));
    }

    #[test]
    fn test_error_reply_carries_kind_and_message() {
        let err = Error::NotEnoughMemory("size = 1099511627776".into());
        let root = parsed(&write_error_reply(&err));
        match read_drop_buffer_reply(&root) {
            Err(Error::NotEnoughMemory(msg)) => assert!(msg.contains("1099511627776")),
            other => panic!("expected NotEnoughMemory, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_message_is_codec_error() {
        assert!(matches!(
            parse_message("{not json"),
            Err(Error::Codec(_))
        ));
    }

    #[test]
    fn test_missing_field_is_invalid() {
        let root = parsed(r#"{"type": "create_buffer_request"}"#);
        assert!(matches!(
            read_create_buffer_request(&root),
            Err(Error::Invalid(_))
        ));
    }

    #[test]
    fn test_misc_round_trips() {
        read_clear_request(&parsed(&write_clear_request())).unwrap();
        read_clear_reply(&parsed(&write_clear_reply())).unwrap();

        let root = parsed(&write_debug_request(json!({"op": "dump"})));
        assert_eq!(read_debug_request(&root).unwrap(), json!({"op": "dump"}));

        let root = parsed(&write_modify_reference_count_request("chunk-9", -2));
        assert_eq!(
            read_modify_reference_count_request(&root).unwrap(),
            ("chunk-9".to_string(), -2)
        );

        let root = parsed(&write_exists_request(ObjectId::from_pointer(0x77)));
        assert_eq!(
            read_exists_request(&root).unwrap(),
            ObjectId::from_pointer(0x77)
        );

        let root = parsed(&write_if_persist_reply(true));
        assert!(read_if_persist_reply(&root).unwrap());

        let root = parsed(&write_instance_status_reply(json!({"footprint": 0})));
        assert_eq!(
            read_instance_status_reply(&root).unwrap(),
            json!({"footprint": 0})
        );

        let root = parsed(&write_cluster_meta_reply(json!({"instances": {}})));
        assert_eq!(
            read_cluster_meta_reply(&root).unwrap(),
            json!({"instances": {}})
        );
    }
}
