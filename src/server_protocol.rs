use serde_json::Value;

use crate::types::Vec3;

#[derive(Debug)]
pub enum ParsedClientMessage {
    Hello {
        name: String,
        lang: Option<String>,
        team: Option<String>,
        clan: Option<String>,
    },
    Chat {
        text: String,
    },
    Console {
        line: String,
    },
    Move {
        position: Vec3,
        flying: Option<bool>,
    },
    Death {
        killer: Option<String>,
    },
    Mount {
        seat: String,
    },
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "hello" => {
            let name = object.get("name")?.as_str()?.to_string();
            let lang = parse_optional_string(object.get("lang"))?;
            let team = parse_optional_string(object.get("team"))?;
            let clan = parse_optional_string(object.get("clan"))?;
            Some(ParsedClientMessage::Hello {
                name,
                lang,
                team,
                clan,
            })
        }
        "chat" => {
            let text = object.get("text")?.as_str()?.to_string();
            Some(ParsedClientMessage::Chat { text })
        }
        "console" => {
            let line = object.get("line")?.as_str()?.to_string();
            Some(ParsedClientMessage::Console { line })
        }
        "move" => {
            let x = parse_finite(object.get("x"))?;
            let y = parse_finite(object.get("y"))?;
            let z = parse_finite(object.get("z"))?;
            let flying = match object.get("flying") {
                None => None,
                Some(value) => Some(value.as_bool()?),
            };
            Some(ParsedClientMessage::Move {
                position: Vec3::new(x, y, z),
                flying,
            })
        }
        "death" => {
            let killer = parse_optional_string(object.get("killer"))?;
            Some(ParsedClientMessage::Death { killer })
        }
        "mount" => {
            let seat = object.get("seat")?.as_str()?.to_string();
            Some(ParsedClientMessage::Mount { seat })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

/// Missing or `null` is `Some(None)`; a value of the wrong type is `None`.
fn parse_optional_string(value: Option<&Value>) -> Option<Option<String>> {
    match value {
        None | Some(Value::Null) => Some(None),
        Some(value) => Some(Some(value.as_str()?.to_string())),
    }
}

fn parse_finite(value: Option<&Value>) -> Option<f32> {
    let number = value?.as_f64()?;
    if !number.is_finite() || number.abs() > f32::MAX as f64 {
        return None;
    }
    Some(number as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_hello_message() {
        let parsed = parse_client_message(r#"{"type":"hello","name":"A","lang":"fr"}"#)
            .expect("hello message should parse");
        match parsed {
            ParsedClientMessage::Hello {
                name,
                lang,
                team,
                clan,
            } => {
                assert_eq!(name, "A");
                assert_eq!(lang.as_deref(), Some("fr"));
                assert_eq!(team, None);
                assert_eq!(clan, None);
            }
            _ => panic!("expected hello message"),
        }
    }

    #[test]
    fn hello_rejects_non_string_team() {
        assert!(parse_client_message(r#"{"type":"hello","name":"A","team":3}"#).is_none());
        assert!(parse_client_message(r#"{"type":"hello","name":"A","team":null}"#).is_some());
    }

    #[test]
    fn parse_move_requires_all_coordinates() {
        let parsed = parse_client_message(r#"{"type":"move","x":1,"y":2.5,"z":-3}"#);
        match parsed {
            Some(ParsedClientMessage::Move { position, flying }) => {
                assert_eq!(position, Vec3::new(1.0, 2.5, -3.0));
                assert_eq!(flying, None);
            }
            other => panic!("expected move message, got {other:?}"),
        }
        assert!(parse_client_message(r#"{"type":"move","x":1,"y":2}"#).is_none());
        assert!(parse_client_message(r#"{"type":"move","x":1e300,"y":0,"z":0}"#).is_none());
    }

    #[test]
    fn parse_death_with_and_without_killer() {
        assert!(matches!(
            parse_client_message(r#"{"type":"death"}"#),
            Some(ParsedClientMessage::Death { killer: None })
        ));
        match parse_client_message(r#"{"type":"death","killer":"p2"}"#) {
            Some(ParsedClientMessage::Death { killer }) => {
                assert_eq!(killer.as_deref(), Some("p2"))
            }
            other => panic!("expected death message, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_console_and_mount() {
        assert!(matches!(
            parse_client_message(r#"{"type":"chat","text":"/manhunt join"}"#),
            Some(ParsedClientMessage::Chat { .. })
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"console","line":"mhunt start"}"#),
            Some(ParsedClientMessage::Console { .. })
        ));
        assert!(matches!(
            parse_client_message(r#"{"type":"mount","seat":"minicopter.pilot"}"#),
            Some(ParsedClientMessage::Mount { .. })
        ));
        assert!(parse_client_message(r#"{"type":"mount"}"#).is_none());
    }

    #[test]
    fn parse_ping_requires_finite_number() {
        let parsed = parse_client_message(r#"{"type":"ping","t":12.5}"#);
        assert!(matches!(parsed, Some(ParsedClientMessage::Ping { .. })));
        assert!(parse_client_message(r#"{"type":"ping","t":"x"}"#).is_none());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert!(parse_client_message(r#"{"type":"lobby_start"}"#).is_none());
        assert!(parse_client_message("not json").is_none());
    }
}
