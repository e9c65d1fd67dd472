//! JSON messages exchanged over the live `BidiGenerateContent` socket.

use serde::{Deserialize, Serialize};

pub const INPUT_AUDIO_MIME: &str = "audio/pcm;rate=16000";

/// Parameters of the opening `setup` message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSetup {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
}

impl SessionSetup {
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };

        let message = SetupMessage {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec!["AUDIO"],
                    speech_config: SpeechConfig {
                        voice_config: VoiceConfig {
                            prebuilt_voice_config: PrebuiltVoiceConfig {
                                voice_name: self.voice.clone(),
                            },
                        },
                    },
                },
                system_instruction: Content {
                    parts: vec![TextPart {
                        text: self.system_instruction.clone(),
                    }],
                },
                input_audio_transcription: Empty {},
                output_audio_transcription: Empty {},
            },
        };
        serde_json::to_string(&message)
    }
}

/// Frames produced by the session for the socket writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundMessage {
    /// Base64 PCM16 at 16 kHz.
    Audio(String),
}

impl OutboundMessage {
    pub fn to_message(&self) -> Result<String, serde_json::Error> {
        match self {
            OutboundMessage::Audio(data) => serde_json::to_string(&RealtimeInputMessage {
                realtime_input: RealtimeInput {
                    media_chunks: vec![MediaChunk {
                        mime_type: INPUT_AUDIO_MIME,
                        data,
                    }],
                },
            }),
        }
    }
}

/// Everything the session reacts to, in the order it must handle them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    SetupComplete,
    Interrupted,
    OutputTranscript(String),
    InputTranscript(String),
    /// Base64 PCM16 at 24 kHz.
    Audio(String),
    TurnComplete,
    GoAway,
    Closed { reason: Option<String> },
    Error(String),
}

/// Split one inbound JSON message into events.
///
/// Unknown fields are ignored; a message that is not JSON at all is an error
/// for the caller to log.
pub fn parse_server_message(raw: &str) -> Result<Vec<ServerEvent>, serde_json::Error> {
    let message: ServerMessage = serde_json::from_str(raw)?;
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(ServerEvent::SetupComplete);
    }

    if let Some(content) = message.server_content {
        if content.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        if let Some(text) = content.input_transcription.and_then(|t| t.text) {
            if !text.is_empty() {
                events.push(ServerEvent::InputTranscript(text));
            }
        }
        if let Some(text) = content.output_transcription.and_then(|t| t.text) {
            if !text.is_empty() {
                events.push(ServerEvent::OutputTranscript(text));
            }
        }
        if let Some(turn) = content.model_turn {
            events.extend(
                turn.parts
                    .into_iter()
                    .filter_map(|part| part.inline_data)
                    .filter(|data| !data.data.is_empty())
                    .map(|data| ServerEvent::Audio(data.data)),
            );
        }
        if content.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }
    }

    if message.go_away.is_some() {
        events.push(ServerEvent::GoAway);
    }

    Ok(events)
}

#[derive(Serialize)]
struct SetupMessage {
    setup: Setup,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Setup {
    model: String,
    generation_config: GenerationConfig,
    system_instruction: Content,
    input_audio_transcription: Empty,
    output_audio_transcription: Empty,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    speech_config: SpeechConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Serialize)]
struct Content {
    parts: Vec<TextPart>,
}

#[derive(Serialize)]
struct TextPart {
    text: String,
}

#[derive(Serialize)]
struct Empty {}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInputMessage<'a> {
    realtime_input: RealtimeInput<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RealtimeInput<'a> {
    media_chunks: Vec<MediaChunk<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MediaChunk<'a> {
    mime_type: &'static str,
    data: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    #[serde(default)]
    setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    server_content: Option<ServerContent>,
    #[serde(default)]
    go_away: Option<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    interrupted: bool,
    #[serde(default)]
    turn_complete: bool,
    #[serde(default)]
    model_turn: Option<ModelTurn>,
    #[serde(default)]
    output_transcription: Option<Transcription>,
    #[serde(default)]
    input_transcription: Option<Transcription>,
}

#[derive(Deserialize)]
struct ModelTurn {
    #[serde(default)]
    parts: Vec<ModelPart>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelPart {
    #[serde(default)]
    inline_data: Option<InlineData>,
}

#[derive(Deserialize)]
struct InlineData {
    #[serde(default)]
    data: String,
}

#[derive(Deserialize)]
struct Transcription {
    #[serde(default)]
    text: Option<String>,
}
