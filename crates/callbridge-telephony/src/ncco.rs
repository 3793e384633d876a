//! Call control objects returned from the answer webhook.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectEndpoint {
    Websocket {
        uri: String,
        #[serde(rename = "content-type")]
        content_type: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum NccoAction {
    /// Plays audio files into the call.
    Stream {
        #[serde(rename = "streamUrl")]
        stream_url: Vec<String>,
    },
    /// Bridges the call to one or more endpoints.
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        from: Option<String>,
        endpoint: Vec<ConnectEndpoint>,
    },
}

/// Ordered list of actions the provider executes when a call is answered.
///
/// Serializes as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Ncco(Vec<NccoAction>);

impl Ncco {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, url: impl Into<String>) -> Self {
        self.0.push(NccoAction::Stream {
            stream_url: vec![url.into()],
        });
        self
    }

    /// Connects the call audio to a WebSocket at `uri`, announcing
    /// `content_type` (e.g. `audio/l16;rate=16000`).
    pub fn connect_websocket(
        mut self,
        from: Option<String>,
        uri: impl Into<String>,
        content_type: impl Into<String>,
    ) -> Self {
        self.0.push(NccoAction::Connect {
            from,
            endpoint: vec![ConnectEndpoint::Websocket {
                uri: uri.into(),
                content_type: content_type.into(),
            }],
        });
        self
    }

    pub fn actions(&self) -> &[NccoAction] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_as_provider_array() {
        let ncco = Ncco::new()
            .stream("https://example.com/silence.mp3")
            .connect_websocket(
                Some("15550001111".to_string()),
                "wss://example.com/socket?call=abc",
                "audio/l16;rate=16000",
            );

        let value = serde_json::to_value(&ncco).unwrap();
        assert_eq!(
            value,
            json!([
                {
                    "action": "stream",
                    "streamUrl": ["https://example.com/silence.mp3"]
                },
                {
                    "action": "connect",
                    "from": "15550001111",
                    "endpoint": [{
                        "type": "websocket",
                        "uri": "wss://example.com/socket?call=abc",
                        "content-type": "audio/l16;rate=16000"
                    }]
                }
            ])
        );
    }

    #[test]
    fn connect_without_caller_id_omits_from() {
        let ncco = Ncco::new().connect_websocket(None, "wss://h/socket", "audio/l16;rate=8000");
        let value = serde_json::to_value(&ncco).unwrap();
        assert!(value[0].get("from").is_none());
        assert_eq!(ncco.actions().len(), 1);
    }
}
