//! Backend (server → client) message parsing.

use super::backend_tag as tag;
use super::auth_code;
use crate::codec::{read_cstr, read_i16, read_i32, read_u16, read_u32};
use crate::error::{Error, ErrorDesc, Result};
use crate::types::{FormatCode, Oid, TransactionStatus};

/// Authentication response carried inside an 'R' message.
#[derive(Debug, Clone)]
pub enum AuthResponse {
    Ok,
    CleartextRequired,
    Md5Required { salt: [u8; 4] },
    GssRequired,
    SspiRequired,
    GssContinue { data: Vec<u8> },
}

impl AuthResponse {
    fn parse(payload: &[u8]) -> Result<Self> {
        let (code, rest) = read_i32(payload)?;
        match code {
            auth_code::OK => Ok(AuthResponse::Ok),
            auth_code::CLEARTEXT_PASSWORD => Ok(AuthResponse::CleartextRequired),
            auth_code::MD5_PASSWORD => {
                let (salt_bytes, _) = crate::codec::read_bytes(rest, 4)?;
                let mut salt = [0u8; 4];
                salt.copy_from_slice(salt_bytes);
                Ok(AuthResponse::Md5Required { salt })
            }
            auth_code::GSS => Ok(AuthResponse::GssRequired),
            auth_code::GSS_CONTINUE => Ok(AuthResponse::GssContinue { data: rest.to_vec() }),
            auth_code::SSPI => Ok(AuthResponse::SspiRequired),
            other => Err(Error::ProtocolError(format!(
                "unknown authentication sub-code: {other}"
            ))),
        }
    }
}

/// Column descriptor from a `RowDescription` message.
#[derive(Debug, Clone)]
pub struct FieldDescription {
    pub name: String,
    pub table_oid: Oid,
    pub column_id: i16,
    pub type_oid: Oid,
    pub type_size: i16,
    pub type_modifier: i32,
    pub format: FormatCode,
}

/// Asynchronous `NOTIFY` delivery.
#[derive(Debug, Clone)]
pub struct Notification {
    pub pid: u32,
    pub channel: String,
    pub payload: String,
}

/// Outcome parsed from a `CommandComplete` tag string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    InsertCompleted { oid: u32, rows: u64 },
    DeleteCompleted(u64),
    UpdateCompleted(u64),
    SelectCompleted(u64),
    MoveCompleted(u64),
    FetchCompleted(u64),
    CopyCompleted(u64),
    CommandOk,
}

impl CommandResult {
    /// Split the command tag on its first space and switch on the leading word.
    fn parse(tag_str: &str) -> Self {
        let mut parts = tag_str.splitn(2, ' ');
        let command = parts.next().unwrap_or_default();
        let rest = parts.next().unwrap_or_default();

        match command {
            "INSERT" => {
                let mut nums = rest.split_whitespace();
                let oid = nums.next().and_then(|s| s.parse().ok());
                let rows = nums.next().and_then(|s| s.parse().ok());
                match (oid, rows) {
                    (Some(oid), Some(rows)) => CommandResult::InsertCompleted { oid, rows },
                    _ => CommandResult::CommandOk,
                }
            }
            "DELETE" => rest
                .trim()
                .parse()
                .map(CommandResult::DeleteCompleted)
                .unwrap_or(CommandResult::CommandOk),
            "UPDATE" => rest
                .trim()
                .parse()
                .map(CommandResult::UpdateCompleted)
                .unwrap_or(CommandResult::CommandOk),
            "SELECT" => rest
                .trim()
                .parse()
                .map(CommandResult::SelectCompleted)
                .unwrap_or(CommandResult::CommandOk),
            "MOVE" => rest
                .trim()
                .parse()
                .map(CommandResult::MoveCompleted)
                .unwrap_or(CommandResult::CommandOk),
            "FETCH" => rest
                .trim()
                .parse()
                .map(CommandResult::FetchCompleted)
                .unwrap_or(CommandResult::CommandOk),
            "COPY" => rest
                .trim()
                .parse()
                .map(CommandResult::CopyCompleted)
                .unwrap_or(CommandResult::CommandOk),
            _ => CommandResult::CommandOk,
        }
    }
}

/// A fully parsed back-end message.
#[derive(Debug, Clone)]
pub enum ServerMessage {
    Authentication(AuthResponse),
    BackendKeyData { process_id: u32, secret_key: u32 },
    BindComplete,
    CloseComplete,
    CommandComplete(CommandResult),
    /// Raw column data, left opaque: parsing requires the matching `RowDescription`.
    DataRow(Vec<u8>),
    EmptyQueryResponse,
    ErrorResponse(ErrorDesc),
    NoData,
    NoticeResponse(ErrorDesc),
    NotificationResponse(Notification),
    ParameterDescription(Vec<Oid>),
    ParameterStatus { name: String, value: String },
    ParseComplete,
    PortalSuspended,
    ReadyForQuery(TransactionStatus),
    RowDescription(Vec<FieldDescription>),
}

impl ServerMessage {
    /// True for messages the default receiver filter accepts.
    pub fn passes_default_filter(&self) -> bool {
        matches!(
            self,
            ServerMessage::ErrorResponse(_)
                | ServerMessage::NoData
                | ServerMessage::ParameterDescription(_)
                | ServerMessage::ReadyForQuery(_)
                | ServerMessage::RowDescription(_)
        )
    }
}

/// Parse the (field-tag-byte, NUL-terminated value) stream shared by
/// `ErrorResponse` and `NoticeResponse`.
fn parse_error_desc(payload: &[u8]) -> Result<ErrorDesc> {
    use crate::error::field_type as ft;

    let mut desc = ErrorDesc::default();
    let mut data = payload;

    while !data.is_empty() && data[0] != 0 {
        let field = data[0];
        data = &data[1..];
        let (value, rest) = read_cstr(data)?;
        data = rest;

        match field {
            ft::SEVERITY => desc.severity = value.to_owned(),
            ft::SEVERITY_NON_LOCALIZED => desc.severity_non_localized = Some(value.to_owned()),
            ft::CODE => desc.code = value.to_owned(),
            ft::MESSAGE => desc.message = value.to_owned(),
            ft::DETAIL => desc.detail = Some(value.to_owned()),
            ft::HINT => desc.hint = Some(value.to_owned()),
            ft::POSITION => desc.position = value.parse().ok(),
            ft::INTERNAL_POSITION => desc.internal_position = value.parse().ok(),
            ft::INTERNAL_QUERY => desc.internal_query = Some(value.to_owned()),
            ft::CONTEXT => desc.context = Some(value.to_owned()),
            ft::SCHEMA => desc.schema = Some(value.to_owned()),
            ft::TABLE => desc.table = Some(value.to_owned()),
            ft::COLUMN => desc.column = Some(value.to_owned()),
            ft::DATA_TYPE => desc.data_type = Some(value.to_owned()),
            ft::CONSTRAINT => desc.constraint = Some(value.to_owned()),
            ft::FILE => desc.source_filename = Some(value.to_owned()),
            ft::LINE => desc.source_line = value.parse().ok(),
            ft::ROUTINE => desc.source_routine = Some(value.to_owned()),
            other => tracing::debug!(field = %(other as char), "unknown error field type"),
        }
    }

    if desc.severity.is_empty() || desc.code.is_empty() || desc.message.is_empty() {
        return Err(Error::ProtocolError(
            "error/notice body missing a required field (S/C/M)".into(),
        ));
    }

    Ok(desc)
}

fn parse_row_description(payload: &[u8]) -> Result<Vec<FieldDescription>> {
    let (num_fields, mut data) = read_u16(payload)?;
    let mut fields = Vec::with_capacity(num_fields as usize);

    for _ in 0..num_fields {
        let (name, rest) = read_cstr(data)?;
        let (table_oid, rest) = read_u32(rest)?;
        let (column_id, rest) = read_i16(rest)?;
        let (type_oid, rest) = read_u32(rest)?;
        let (type_size, rest) = read_i16(rest)?;
        let (type_modifier, rest) = read_i32(rest)?;
        let (format, rest) = read_u16(rest)?;

        fields.push(FieldDescription {
            name: name.to_owned(),
            table_oid,
            column_id,
            type_oid,
            type_size,
            type_modifier,
            format: FormatCode::from_u16(format),
        });
        data = rest;
    }

    Ok(fields)
}

fn parse_parameter_description(payload: &[u8]) -> Result<Vec<Oid>> {
    let (num_params, mut data) = read_u16(payload)?;
    let mut oids = Vec::with_capacity(num_params as usize);
    for _ in 0..num_params {
        let (oid, rest) = read_u32(data)?;
        oids.push(oid);
        data = rest;
    }
    Ok(oids)
}

fn parse_notification(payload: &[u8]) -> Result<Notification> {
    let (pid, rest) = read_u32(payload)?;
    let (channel, rest) = read_cstr(rest)?;
    let (payload_str, _) = read_cstr(rest)?;
    Ok(Notification {
        pid,
        channel: channel.to_owned(),
        payload: payload_str.to_owned(),
    })
}

fn parse_backend_key_data(payload: &[u8]) -> Result<(u32, u32)> {
    let (process_id, rest) = read_u32(payload)?;
    let (secret_key, _) = read_u32(rest)?;
    Ok((process_id, secret_key))
}

/// Parse one message body given its type tag, per the table in [`super::backend_tag`].
fn parse_message(type_byte: u8, payload: &[u8]) -> Result<ServerMessage> {
    match type_byte {
        tag::AUTHENTICATION => Ok(ServerMessage::Authentication(AuthResponse::parse(payload)?)),
        tag::BACKEND_KEY_DATA => {
            let (process_id, secret_key) = parse_backend_key_data(payload)?;
            Ok(ServerMessage::BackendKeyData { process_id, secret_key })
        }
        tag::PARAMETER_STATUS => {
            let (name, rest) = read_cstr(payload)?;
            let (value, _) = read_cstr(rest)?;
            Ok(ServerMessage::ParameterStatus {
                name: name.to_owned(),
                value: value.to_owned(),
            })
        }
        tag::READY_FOR_QUERY => {
            let (status, _) = crate::codec::read_bytes(payload, 1)?;
            let status = TransactionStatus::from_byte(status[0]).ok_or_else(|| {
                Error::ProtocolError(format!("unknown transaction status byte: {}", status[0]))
            })?;
            Ok(ServerMessage::ReadyForQuery(status))
        }
        tag::ROW_DESCRIPTION => Ok(ServerMessage::RowDescription(parse_row_description(payload)?)),
        tag::DATA_ROW => Ok(ServerMessage::DataRow(payload.to_vec())),
        tag::COMMAND_COMPLETE => {
            let (tag_str, _) = read_cstr(payload)?;
            Ok(ServerMessage::CommandComplete(CommandResult::parse(tag_str)))
        }
        tag::EMPTY_QUERY_RESPONSE => Ok(ServerMessage::EmptyQueryResponse),
        tag::ERROR_RESPONSE => Ok(ServerMessage::ErrorResponse(parse_error_desc(payload)?)),
        tag::NOTICE_RESPONSE => Ok(ServerMessage::NoticeResponse(parse_error_desc(payload)?)),
        tag::NOTIFICATION_RESPONSE => {
            Ok(ServerMessage::NotificationResponse(parse_notification(payload)?))
        }
        tag::PARSE_COMPLETE => Ok(ServerMessage::ParseComplete),
        tag::BIND_COMPLETE => Ok(ServerMessage::BindComplete),
        tag::CLOSE_COMPLETE => Ok(ServerMessage::CloseComplete),
        tag::PARAMETER_DESCRIPTION => {
            Ok(ServerMessage::ParameterDescription(parse_parameter_description(payload)?))
        }
        tag::NO_DATA => Ok(ServerMessage::NoData),
        tag::PORTAL_SUSPENDED => Ok(ServerMessage::PortalSuspended),
        other => Err(Error::ProtocolError(format!(
            "unknown backend message tag: {:?}",
            other as char
        ))),
    }
}

/// Decode the next message out of `buffer`, invoking `read_more` to top it up as needed.
///
/// `read_more` appends bytes to the buffer it is handed and returns the enlarged buffer;
/// it must error (rather than return an unchanged buffer) on EOF. Returns the remaining,
/// unconsumed buffer alongside the parsed message.
pub fn decode_next_server_message<F>(mut buffer: Vec<u8>, mut read_more: F) -> Result<(Vec<u8>, ServerMessage)>
where
    F: FnMut(Vec<u8>) -> Result<Vec<u8>>,
{
    loop {
        if buffer.len() < 5 {
            buffer = read_more(buffer)?;
            continue;
        }

        let type_byte = buffer[0];
        let (len, _) = read_i32(&buffer[1..5])?;
        if len < 4 {
            return Err(Error::ProtocolError(format!(
                "frame length {len} is smaller than the length field itself"
            )));
        }
        let body_len = (len - 4) as usize;
        let total = 5 + body_len;

        if buffer.len() < total {
            buffer = read_more(buffer)?;
            continue;
        }

        let payload = &buffer[5..total];
        let message = parse_message(type_byte, payload)?;
        let remaining = buffer[total..].to_vec();
        return Ok((remaining, message));
    }
}
