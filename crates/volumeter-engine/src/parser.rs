//! Conntrack event-line parsing built on `nom`.
//!
//! A line has two tab-separated segments: a bracketed timestamp and a run of
//! whitespace-delimited fields. Fields are classified into bracketed tokens
//! (`[DESTROY]`, `[UNREPLIED]`, ...), `key=value` pairs, and bare words
//! (protocol names, timeouts, TCP state names). The destroy family is the
//! only kind carrying accounted volumes; everything else is "active".
//!
//! Counter fields occur once per direction, forward first. Replied lines
//! carry both directions and their volumes are summed; lines marked
//! `[UNREPLIED]` carry usable counters for the forward direction only.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{all_consuming, map},
    sequence::{delimited, separated_pair},
};
use thiserror::Error;
use volumeter_common::constants::ICMP_SENTINEL_PORT;
use volumeter_common::types::{Event, EventKind, Protocol};

/// A rejected event line. These are expected noise on a live feed; callers
/// log and discard them without stopping the ingest path.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line has no tab-separated timestamp segment.
    #[error("line has no timestamp segment")]
    MissingTimestamp,
    /// The field segment contains no tokens.
    #[error("line has no event fields")]
    EmptyFields,
    /// The first field is not a bracketed event kind.
    #[error("expected bracketed event kind, got {0:?}")]
    UnexpectedKind(String),
    /// No protocol token follows the event kind.
    #[error("line carries no protocol token")]
    MissingProtocol,
    /// A field required for this line variant is absent.
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    /// A numeric field does not parse.
    #[error("invalid value {value:?} for field `{field}`")]
    InvalidValue {
        /// Name of the offending field.
        field: &'static str,
        /// Raw text that failed to parse.
        value: String,
    },
}

/// One classified field token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    /// A `[...]` token: event kind or a status flag.
    Bracketed(&'a str),
    /// A `key=value` pair.
    KeyValue { key: &'a str, value: &'a str },
    /// Anything else: protocol name, timeout, state name.
    Bare(&'a str),
}

fn bracketed(input: &str) -> IResult<&str, Token<'_>> {
    map(
        delimited(char('['), take_while1(|c| c != ']'), char(']')),
        Token::Bracketed,
    )
    .parse(input)
}

fn key_value(input: &str) -> IResult<&str, Token<'_>> {
    map(
        separated_pair(
            take_while1(|c: char| c.is_ascii_alphanumeric() || c == '_'),
            char('='),
            take_while1(|c: char| !c.is_whitespace()),
        ),
        |(key, value)| Token::KeyValue { key, value },
    )
    .parse(input)
}

fn bare(input: &str) -> IResult<&str, Token<'_>> {
    map(take_while1(|c: char| !c.is_whitespace()), Token::Bare).parse(input)
}

/// Classifies one whitespace-delimited field. Tokens that fail structured
/// classification (e.g. an unterminated bracket) degrade to bare words and
/// are caught by the interpretation phase.
fn classify(token: &str) -> Token<'_> {
    all_consuming(alt((bracketed, key_value, bare)))
        .parse(token)
        .map_or(Token::Bare(token), |(_, tok)| tok)
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

fn parse_port(value: &str) -> Result<u16, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidValue {
        field: "dport",
        value: value.to_string(),
    })
}

/// Parses one conntrack event line.
///
/// Returns `Ok(None)` for protocol families the engine does not track
/// (recognized and silently ignored). The destination address is surfaced
/// on the event; the caller decides whether it matches the monitored
/// address.
///
/// # Errors
///
/// Returns a [`ParseError`] for lines that do not match the expected shape:
/// missing timestamp, non-bracketed kind, absent required fields, or
/// non-numeric counters.
pub fn parse_event(line: &str) -> Result<Option<Event>, ParseError> {
    let (ts_segment, field_segment) =
        line.split_once('\t').ok_or(ParseError::MissingTimestamp)?;
    let timestamp = ts_segment
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();

    let tokens: Vec<Token<'_>> = field_segment.split_whitespace().map(classify).collect();

    let Some(first) = tokens.first() else {
        return Err(ParseError::EmptyFields);
    };
    let is_destroy = match first {
        Token::Bracketed(kind) => kind.eq_ignore_ascii_case("destroy"),
        Token::KeyValue { key, value } => {
            return Err(ParseError::UnexpectedKind(format!("{key}={value}")));
        }
        Token::Bare(word) => return Err(ParseError::UnexpectedKind((*word).to_string())),
    };

    let proto_token = tokens[1..]
        .iter()
        .find_map(|tok| match tok {
            Token::Bare(word) => Some(*word),
            _ => None,
        })
        .ok_or(ParseError::MissingProtocol)?;
    let Some(protocol) = Protocol::from_token(proto_token) else {
        // Recognized but untracked family: not an error, just not ours.
        return Ok(None);
    };

    // Field occurrences in line order. The first dst/dport pair is the
    // forward direction; the second packets/bytes pair (replied lines only)
    // is the reverse direction.
    let mut dst_addr: Option<&str> = None;
    let mut dst_port: Option<&str> = None;
    let mut packets: Vec<u64> = Vec::with_capacity(2);
    let mut bytes: Vec<u64> = Vec::with_capacity(2);
    let mut unreplied = false;

    for token in &tokens[1..] {
        match *token {
            Token::Bracketed(flag) if flag.eq_ignore_ascii_case("unreplied") => {
                unreplied = true;
            }
            Token::KeyValue { key: "dst", value } => {
                if dst_addr.is_none() {
                    dst_addr = Some(value);
                }
            }
            Token::KeyValue { key: "dport", value } => {
                if dst_port.is_none() {
                    dst_port = Some(value);
                }
            }
            Token::KeyValue { key: "packets", value } => {
                if packets.len() < 2 {
                    packets.push(parse_u64("packets", value)?);
                }
            }
            Token::KeyValue { key: "bytes", value } => {
                if bytes.len() < 2 {
                    bytes.push(parse_u64("bytes", value)?);
                }
            }
            _ => {}
        }
    }

    let dst_addr = dst_addr.ok_or(ParseError::MissingField("dst"))?.to_string();
    let dst_port = match protocol {
        Protocol::Icmp => ICMP_SENTINEL_PORT,
        Protocol::Tcp | Protocol::Udp => {
            parse_port(dst_port.ok_or(ParseError::MissingField("dport"))?)?
        }
    };

    let kind = if is_destroy {
        let forward_packets = *packets.first().ok_or(ParseError::MissingField("packets"))?;
        let forward_bytes = *bytes.first().ok_or(ParseError::MissingField("bytes"))?;
        if unreplied {
            EventKind::Destroy {
                packets: forward_packets,
                bytes: forward_bytes,
            }
        } else {
            let reverse_packets = *packets.get(1).ok_or(ParseError::MissingField("packets"))?;
            let reverse_bytes = *bytes.get(1).ok_or(ParseError::MissingField("bytes"))?;
            EventKind::Destroy {
                packets: forward_packets + reverse_packets,
                bytes: forward_bytes + reverse_bytes,
            }
        }
    } else {
        EventKind::Active
    };

    Ok(Some(Event {
        timestamp,
        kind,
        protocol,
        dst_addr,
        dst_port,
        replied: !unreplied,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLIED_DESTROY: &str = "[1503564754.293061]\t [DESTROY] tcp      6 \
        src=10.0.2.15 dst=147.32.83.179 sport=53432 dport=443 packets=5 bytes=2000 \
        src=147.32.83.179 dst=10.0.2.15 sport=443 dport=53432 packets=7 bytes=1000";

    const UNREPLIED_DESTROY: &str = "[1503564754.293061]\t [DESTROY] tcp      6 \
        src=10.0.2.15 dst=147.32.83.179 sport=53432 dport=443 packets=5 bytes=528 \
        [UNREPLIED] src=147.32.83.179 dst=10.0.2.15 sport=443 dport=53432";

    const ACTIVE_TCP: &str = "[1503564754.100000]\t [UPDATE] tcp      6 431999 ESTABLISHED \
        src=10.0.2.15 dst=147.32.83.179 sport=53432 dport=443 \
        src=147.32.83.179 dst=10.0.2.15 sport=443 dport=53432 [ASSURED]";

    const NEW_UDP: &str = "[1503564754.200000]\t    [NEW] udp      17 30 \
        src=10.0.2.15 dst=147.32.83.179 sport=40123 dport=53 \
        [UNREPLIED] src=147.32.83.179 dst=10.0.2.15 sport=53 dport=40123";

    const ICMP_DESTROY: &str = "[1503564754.400000]\t [DESTROY] icmp     1 \
        src=10.0.2.15 dst=147.32.83.179 type=8 code=0 id=9 packets=3 bytes=252 \
        src=147.32.83.179 dst=10.0.2.15 type=0 code=0 id=9 packets=3 bytes=252";

    fn parse_ok(line: &str) -> Event {
        parse_event(line)
            .expect("should parse")
            .expect("should be a tracked event")
    }

    #[test]
    fn replied_destroy_sums_both_directions() {
        let event = parse_ok(REPLIED_DESTROY);
        assert_eq!(event.protocol, Protocol::Tcp);
        assert_eq!(event.dst_addr, "147.32.83.179");
        assert_eq!(event.dst_port, 443);
        assert!(event.replied);
        assert_eq!(
            event.kind,
            EventKind::Destroy {
                packets: 12,
                bytes: 3000
            }
        );
    }

    #[test]
    fn unreplied_destroy_uses_forward_direction_only() {
        let event = parse_ok(UNREPLIED_DESTROY);
        assert!(!event.replied);
        assert_eq!(
            event.kind,
            EventKind::Destroy {
                packets: 5,
                bytes: 528
            }
        );
    }

    #[test]
    fn update_line_is_active() {
        let event = parse_ok(ACTIVE_TCP);
        assert_eq!(event.kind, EventKind::Active);
        assert_eq!(event.dst_addr, "147.32.83.179");
        assert_eq!(event.dst_port, 443);
    }

    #[test]
    fn new_udp_line_is_active() {
        let event = parse_ok(NEW_UDP);
        assert_eq!(event.kind, EventKind::Active);
        assert_eq!(event.protocol, Protocol::Udp);
        assert_eq!(event.dst_port, 53);
        assert!(!event.replied);
    }

    #[test]
    fn icmp_destroy_uses_sentinel_port() {
        let event = parse_ok(ICMP_DESTROY);
        assert_eq!(event.protocol, Protocol::Icmp);
        assert_eq!(event.dst_port, ICMP_SENTINEL_PORT);
        assert_eq!(
            event.kind,
            EventKind::Destroy {
                packets: 6,
                bytes: 504
            }
        );
    }

    #[test]
    fn timestamp_passes_through_without_brackets() {
        let event = parse_ok(REPLIED_DESTROY);
        assert_eq!(event.timestamp, "1503564754.293061");
    }

    #[test]
    fn untracked_protocol_is_ignored_not_an_error() {
        let line = "[1503564754.5]\t [DESTROY] gre 47 src=10.0.2.15 dst=147.32.83.179";
        assert_eq!(parse_event(line), Ok(None));
    }

    #[test]
    fn line_without_timestamp_segment_is_rejected() {
        let line = "[DESTROY] tcp 6 src=10.0.2.15 dst=147.32.83.179 sport=1 dport=2";
        assert_eq!(parse_event(line), Err(ParseError::MissingTimestamp));
    }

    #[test]
    fn line_with_empty_field_segment_is_rejected() {
        assert_eq!(parse_event("[1503564754.5]\t  "), Err(ParseError::EmptyFields));
    }

    #[test]
    fn non_bracketed_kind_is_rejected() {
        let line = "[1503564754.5]\t DESTROY tcp 6 src=a dst=b sport=1 dport=2";
        assert_eq!(
            parse_event(line),
            Err(ParseError::UnexpectedKind("DESTROY".into()))
        );
    }

    #[test]
    fn unterminated_kind_bracket_is_rejected() {
        let line = "[1503564754.5]\t [DESTROY tcp 6 src=a dst=b sport=1 dport=2";
        assert_eq!(
            parse_event(line),
            Err(ParseError::UnexpectedKind("[DESTROY".into()))
        );
    }

    #[test]
    fn non_numeric_counter_is_rejected() {
        let line = "[1503564754.5]\t [DESTROY] tcp 6 src=a dst=b sport=1 dport=443 \
            packets=abc bytes=10 src=b dst=a sport=443 dport=1 packets=1 bytes=1";
        assert_eq!(
            parse_event(line),
            Err(ParseError::InvalidValue {
                field: "packets",
                value: "abc".into()
            })
        );
    }

    #[test]
    fn destroy_without_counters_is_rejected() {
        let line = "[1503564754.5]\t [DESTROY] tcp 6 src=a dst=b sport=1 dport=443";
        assert_eq!(parse_event(line), Err(ParseError::MissingField("packets")));
    }

    #[test]
    fn replied_destroy_without_reverse_counters_is_rejected() {
        let line = "[1503564754.5]\t [DESTROY] tcp 6 src=a dst=b sport=1 dport=443 \
            packets=5 bytes=100";
        assert_eq!(parse_event(line), Err(ParseError::MissingField("packets")));
    }

    #[test]
    fn missing_dport_is_rejected_for_tcp() {
        let line = "[1503564754.5]\t [NEW] tcp 6 120 SYN_SENT src=a dst=b sport=1";
        assert_eq!(parse_event(line), Err(ParseError::MissingField("dport")));
    }

    #[test]
    fn out_of_range_dport_is_rejected() {
        let line = "[1503564754.5]\t [NEW] tcp 6 120 SYN_SENT src=a dst=b sport=1 dport=70000";
        assert!(matches!(
            parse_event(line),
            Err(ParseError::InvalidValue { field: "dport", .. })
        ));
    }
}
