//! JSON wire format for sessions
//!
//! Export produces a list of session objects; import accepts either a list or
//! a single object so that a correlation-scoped endpoint may answer with just
//! the one matching session.

use crate::error::Result;
use crate::session::Session;
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
#[serde(untagged)]
enum Payload {
    Many(Vec<Session>),
    One(Box<Session>),
}

/// Serialize sessions as a JSON list, preserving order
pub fn encode_sessions(sessions: &[Arc<Session>]) -> Result<String> {
    let refs: Vec<&Session> = sessions.iter().map(Arc::as_ref).collect();
    Ok(serde_json::to_string(&refs)?)
}

pub fn encode_session(session: &Session) -> Result<String> {
    Ok(serde_json::to_string(session)?)
}

/// Parse a list of sessions (or a single session); blank input is an empty list
pub fn decode_sessions(bytes: &[u8]) -> Result<Vec<Session>> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    match serde_json::from_slice::<Payload>(bytes) {
        Ok(Payload::Many(sessions)) => Ok(sessions),
        Ok(Payload::One(session)) => Ok(vec![*session]),
        // Re-parse as a list to surface a useful error message.
        Err(_) => Ok(serde_json::from_slice::<Vec<Session>>(bytes)?),
    }
}
