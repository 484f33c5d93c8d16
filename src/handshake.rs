//! Startup, authentication and parameter-status collection (C3).

use crate::error::{Error, Result};
use crate::message::backend::{AuthResponse, ServerMessage};
use crate::message::frontend::{self, PasswordForm};
use crate::transport::Transport;

const INITIAL_BUFFER_SIZE: usize = 1024;
const READ_CHUNK_SIZE: usize = 4096;

/// Server version as reported during handshake: `major.minor.revision` plus any
/// trailing descriptor text the server appended (e.g. beta tags, distro suffixes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    pub revision: u32,
    pub descriptor: String,
}

impl ServerVersion {
    /// Parse the leading run of `[0-9.]` bytes, split on `.`; anything after that run is
    /// kept verbatim as the descriptor. Missing trailing components default to 0.
    fn parse(value: &str) -> Result<Self> {
        let cut = value
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(value.len());
        let (numeric, descriptor) = value.split_at(cut);

        if numeric.is_empty() {
            return Err(Error::ProtocolError(format!(
                "server_version has no numeric prefix: {value:?}"
            )));
        }

        let mut parts = numeric.split('.');
        let major = parts.next().unwrap_or("0").parse().unwrap_or(0);
        let minor = parts.next().unwrap_or("0").parse().unwrap_or(0);
        let revision = parts.next().unwrap_or("0").parse().unwrap_or(0);

        Ok(ServerVersion {
            major,
            minor,
            revision,
            descriptor: descriptor.to_owned(),
        })
    }
}

/// Connection-wide parameters captured once during handshake and immutable thereafter.
#[derive(Debug, Clone)]
pub struct ConnectionParameters {
    pub server_version: ServerVersion,
    pub server_encoding: String,
    pub integer_datetimes: bool,
}

/// `"on"`, `"yes"`, `"1"` are true; anything else is false. Never an error.
fn parse_integer_datetimes(value: &str) -> bool {
    matches!(value, "on" | "yes" | "1")
}

/// Drive the startup/auth/parameter-collection state machine to completion. On any
/// failure the transport is closed before the error is returned.
pub fn handshake(
    transport: &mut Transport,
    user: &str,
    password: &str,
    database: &str,
) -> Result<ConnectionParameters> {
    match run(transport, user, password, database) {
        Ok(params) => Ok(params),
        Err(e) => {
            transport.close();
            Err(e)
        }
    }
}

fn run(
    transport: &mut Transport,
    user: &str,
    password: &str,
    database: &str,
) -> Result<ConnectionParameters> {
    let mut out = Vec::new();
    frontend::write_startup(&mut out, user, database);
    transport.send(&out)?;
    transport.flush()?;

    let mut buffer = Vec::with_capacity(INITIAL_BUFFER_SIZE);

    loop {
        let (remaining, message) =
            crate::message::backend::decode_next_server_message(buffer, |buf| {
                transport.receive_more(buf, READ_CHUNK_SIZE)
            })?;
        buffer = remaining;

        match message {
            ServerMessage::Authentication(AuthResponse::Ok) => break,
            ServerMessage::Authentication(AuthResponse::CleartextRequired) => {
                send_password(transport, &PasswordForm::Plain(password))?;
            }
            ServerMessage::Authentication(AuthResponse::Md5Required { salt }) => {
                let hashed = frontend::md5_password(user, password, &salt);
                send_password(transport, &PasswordForm::Md5Hashed(&hashed))?;
            }
            ServerMessage::Authentication(AuthResponse::GssRequired)
            | ServerMessage::Authentication(AuthResponse::SspiRequired)
            | ServerMessage::Authentication(AuthResponse::GssContinue { .. }) => {
                return Err(Error::AuthNotSupported(
                    "GSSAPI/SSPI authentication is not supported".into(),
                ));
            }
            ServerMessage::ErrorResponse(desc) => return Err(Error::PostgresError(Box::new(desc))),
            other => {
                return Err(Error::ProtocolError(format!(
                    "unexpected message awaiting authentication: {other:?}"
                )));
            }
        }
    }

    collect_parameters(transport, buffer)
}

fn send_password(transport: &mut Transport, form: &PasswordForm<'_>) -> Result<()> {
    let mut out = Vec::new();
    frontend::write_password(&mut out, form);
    transport.send(&out)?;
    transport.flush()
}

fn collect_parameters(
    transport: &mut Transport,
    mut buffer: Vec<u8>,
) -> Result<ConnectionParameters> {
    let mut server_version = None;
    let mut server_encoding = None;
    let mut integer_datetimes = None;

    loop {
        let (remaining, message) =
            crate::message::backend::decode_next_server_message(buffer, |buf| {
                transport.receive_more(buf, READ_CHUNK_SIZE)
            })?;
        buffer = remaining;

        match message {
            ServerMessage::ParameterStatus { name, value } => match name.as_str() {
                "server_version" => server_version = Some(ServerVersion::parse(&value)?),
                "server_encoding" => server_encoding = Some(value),
                "integer_datetimes" => integer_datetimes = Some(parse_integer_datetimes(&value)),
                _ => {}
            },
            ServerMessage::ErrorResponse(desc) => return Err(Error::PostgresError(Box::new(desc))),
            ServerMessage::ReadyForQuery(_) => break,
            _ => {}
        }
    }

    let server_version = server_version.ok_or_else(|| {
        Error::ProtocolError("handshake completed without server_version".into())
    })?;
    let server_encoding = server_encoding.ok_or_else(|| {
        Error::ProtocolError("handshake completed without server_encoding".into())
    })?;
    let integer_datetimes = integer_datetimes.ok_or_else(|| {
        Error::ProtocolError("handshake completed without integer_datetimes".into())
    })?;

    Ok(ConnectionParameters {
        server_version,
        server_encoding,
        integer_datetimes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_version_parses_trailing_descriptor() {
        let v = ServerVersion::parse("9.6.3").expect("parse");
        assert_eq!(v, ServerVersion { major: 9, minor: 6, revision: 3, descriptor: String::new() });
    }

    #[test]
    fn server_version_missing_components_default_to_zero() {
        let v = ServerVersion::parse("14").expect("parse");
        assert_eq!(v.major, 14);
        assert_eq!(v.minor, 0);
        assert_eq!(v.revision, 0);
    }

    #[test]
    fn server_version_rejects_non_numeric_prefix() {
        assert!(ServerVersion::parse("beta-release").is_err());
    }

    #[test]
    fn integer_datetimes_variants() {
        assert!(parse_integer_datetimes("on"));
        assert!(parse_integer_datetimes("yes"));
        assert!(parse_integer_datetimes("1"));
        assert!(!parse_integer_datetimes("off"));
        assert!(!parse_integer_datetimes("0"));
    }
}
