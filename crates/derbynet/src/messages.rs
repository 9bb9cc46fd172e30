//! Outbound timer messages
//!
//! Every message is a form POST with `action=timer-message` and
//! `message=<NAME>`, followed by the message specific fields.

use contracts::{LaneTimes, LANE_COUNT};

/// Form fields of one request, in send order
pub type FormFields = Vec<(String, String)>;

/// Timer to server message
#[derive(Debug, Clone, PartialEq)]
pub enum TimerMessage {
    Hello,
    Identified {
        timer: String,
        human: String,
        ident: String,
    },
    Flags {
        ports: String,
        device_id: String,
        device_name: String,
    },
    Heartbeat,
    Started,
    /// Lane times in seconds; 0.0 lanes are left out
    Finished {
        round_id: u32,
        heat: u32,
        times: LaneTimes,
    },
    Malfunction {
        detectable: bool,
        error: String,
    },
}

impl TimerMessage {
    /// Wire name of the message
    pub fn name(&self) -> &'static str {
        match self {
            TimerMessage::Hello => "HELLO",
            TimerMessage::Identified { .. } => "IDENTIFIED",
            TimerMessage::Flags { .. } => "FLAGS",
            TimerMessage::Heartbeat => "HEARTBEAT",
            TimerMessage::Started => "STARTED",
            TimerMessage::Finished { .. } => "FINISHED",
            TimerMessage::Malfunction { .. } => "MALFUNCTION",
        }
    }

    /// Build the form body
    pub fn fields(&self) -> FormFields {
        let mut fields = vec![
            field("action", "timer-message"),
            field("message", self.name()),
        ];

        match self {
            TimerMessage::Hello | TimerMessage::Heartbeat | TimerMessage::Started => {}
            TimerMessage::Identified {
                timer,
                human,
                ident,
            } => {
                fields.push(field("lane_count", LANE_COUNT.to_string()));
                fields.push(field("timer", timer));
                fields.push(field("human", human));
                fields.push(field("ident", ident));
            }
            TimerMessage::Flags {
                ports,
                device_id,
                device_name,
            } => {
                fields.push(field("ports", ports));
                fields.push(field(format!("device-{device_id}"), device_name));
            }
            TimerMessage::Finished {
                round_id,
                heat,
                times,
            } => {
                fields.push(field("roundid", round_id.to_string()));
                fields.push(field("heat", heat.to_string()));
                for (idx, time) in times.iter().enumerate() {
                    // 0.0 means no reading, not a zero time
                    if *time != 0.0 {
                        fields.push(field(format!("lane{}", idx + 1), format!("{time:.5}")));
                    }
                }
            }
            TimerMessage::Malfunction { detectable, error } => {
                fields.push(field("detectable", if *detectable { "1" } else { "0" }));
                fields.push(field("error", error));
            }
        }
        fields
    }
}

/// Login form for the timer role
pub fn login_fields(username: &str, password: &str) -> FormFields {
    vec![
        field("action", "role.login"),
        field("name", username),
        field("password", password),
    ]
}

fn field(key: impl Into<String>, value: impl Into<String>) -> (String, String) {
    (key.into(), value.into())
}
