use crate::coordinator::render::Frame;
use crate::error::TabbyError;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Upper bound on a single frame; anything larger is a protocol error, not
/// a legitimate message.
const MAX_FRAME_BYTES: u32 = 1024 * 1024;

/// Messages a viewer sends us.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "control/attach")]
    Attach {
        #[serde(rename = "paneId")]
        pane_id: String,
    },
    #[serde(rename = "control/detach")]
    Detach {
        #[serde(rename = "paneId")]
        pane_id: String,
    },
    #[serde(rename = "control/resize")]
    ControlResize {
        #[serde(rename = "paneId")]
        pane_id: String,
        cols: u16,
        rows: u16,
    },
    #[serde(rename = "sidebar/resize")]
    SidebarResize {
        width: u16,
        height: u16,
        #[serde(default)]
        color_profile: Option<String>,
    },
    #[serde(rename = "sidebar/input")]
    Input(InputEvent),
}

/// One input event. The envelope's `type` tag is `sidebar/input`; the
/// event kind travels in `kind` (a second `type` key in the same flat
/// object would be unrepresentable).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InputEvent {
    pub seq: u64,
    pub kind: InputKind,
    #[serde(default)]
    pub resolved_action: Option<String>,
    #[serde(default)]
    pub resolved_target: Option<String>,
    #[serde(rename = "mouseX", default)]
    pub mouse_x: Option<u16>,
    #[serde(rename = "mouseY", default)]
    pub mouse_y: Option<u16>,
    #[serde(default)]
    pub button: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(rename = "viewportOffset", default)]
    pub viewport_offset: Option<usize>,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    Action,
    Mouse,
    Key,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MenuItem {
    pub label: String,
    pub action: String,
    pub target: String,
}

/// Messages we send a viewer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "render")]
    Render(Frame),
    #[serde(rename = "control/attached_pane")]
    AttachedPane {
        #[serde(rename = "paneId")]
        pane_id: String,
    },
    #[serde(rename = "control/pty_health")]
    PtyHealth { mode: String, healthy: bool },
    #[serde(rename = "menu")]
    Menu { items: Vec<MenuItem> },
    #[serde(rename = "marker_picker")]
    MarkerPicker { markers: Vec<String> },
}

impl ServerMessage {
    pub fn is_render(&self) -> bool {
        matches!(self, ServerMessage::Render(_))
    }
}

/// Length-prefixed JSON framing: u32 big-endian byte count, then the body.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), TabbyError>
where
    W: AsyncWriteExt + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(message)?;
    if body.len() as u32 > MAX_FRAME_BYTES {
        return Err(TabbyError::Protocol(format!(
            "outbound frame of {} bytes exceeds limit",
            body.len()
        )));
    }
    writer.write_all(&(body.len() as u32).to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one frame. `Ok(None)` means the peer closed cleanly between
/// frames; a mid-frame close is an error.
pub async fn read_message<R>(reader: &mut R) -> Result<Option<ClientMessage>, TabbyError>
where
    R: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_FRAME_BYTES {
        return Err(TabbyError::Protocol(format!(
            "inbound frame of {len} bytes exceeds limit"
        )));
    }
    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;
    let message = serde_json::from_slice(&body)?;
    Ok(Some(message))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_field_names() {
        let msg = ClientMessage::Attach {
            pane_id: "%4".into(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"control/attach""#));
        assert!(json.contains(r#""paneId":"%4""#));
    }

    #[test]
    fn test_input_envelope_shapes() {
        let action = r#"{
            "type": "sidebar/input",
            "seq": 3,
            "kind": "action",
            "resolved_action": "select_window",
            "resolved_target": "1"
        }"#;
        let ClientMessage::Input(event) = serde_json::from_str(action).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(event.kind, InputKind::Action);
        assert_eq!(event.resolved_action.as_deref(), Some("select_window"));

        let mouse = r#"{
            "type": "sidebar/input",
            "seq": 9,
            "kind": "mouse",
            "mouseX": 4,
            "mouseY": 12,
            "button": "left",
            "action": "press",
            "viewportOffset": 3
        }"#;
        let ClientMessage::Input(event) = serde_json::from_str(mouse).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(event.kind, InputKind::Mouse);
        assert_eq!(event.mouse_y, Some(12));
        assert_eq!(event.viewport_offset, Some(3));

        let key = r#"{"type":"sidebar/input","seq":1,"kind":"key","key":"j"}"#;
        let ClientMessage::Input(event) = serde_json::from_str(key).unwrap() else {
            panic!("wrong variant");
        };
        assert_eq!(event.key.as_deref(), Some("j"));
    }

    #[tokio::test]
    async fn test_framing_round_trip() {
        let msg = ClientMessage::SidebarResize {
            width: 25,
            height: 40,
            color_profile: Some("truecolor".into()),
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &msg).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let read = read_message(&mut cursor).await.unwrap().unwrap();
        assert_eq!(read, msg);

        // A second read on the drained stream is a clean EOF.
        assert!(read_message(&mut cursor).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME_BYTES + 1).to_be_bytes());
        buf.extend_from_slice(b"xxxx");
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_message(&mut cursor).await.is_err());
    }

    #[tokio::test]
    async fn test_bad_json_is_an_error_not_a_panic() {
        let body = b"{not json";
        let mut buf = Vec::new();
        buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
        buf.extend_from_slice(body);
        let mut cursor = std::io::Cursor::new(buf);
        assert!(read_message(&mut cursor).await.is_err());
    }
}
