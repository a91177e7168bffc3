use crate::messages::wire::{BufferReader, BufferWriter, WireError, WireTag};
use crate::models::{IdRecord, numeric};

/// 現行のメッセージ版数
pub const MESSAGE_VERSION: u16 = 1;

/// メッセージ種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Assignment,
    AssignmentAck,
    Cue,
    CueAck,
    CombatStatus,
}

impl WireTag for MessageType {
    const FIELD: &'static str = "message type";

    fn to_tag(self) -> u16 {
        match self {
            MessageType::Assignment => 1,
            MessageType::AssignmentAck => 2,
            MessageType::Cue => 3,
            MessageType::CueAck => 4,
            MessageType::CombatStatus => 5,
        }
    }

    fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            1 => Some(MessageType::Assignment),
            2 => Some(MessageType::AssignmentAck),
            3 => Some(MessageType::Cue),
            4 => Some(MessageType::CueAck),
            5 => Some(MessageType::CombatStatus),
            _ => None,
        }
    }
}

/// メッセージ共通ヘッダ
///
/// 遅延処理時刻が設定されたメッセージは、その時刻になるまで処理されません。
#[derive(Debug, Clone, PartialEq)]
pub struct MessageHeader {
    pub message_type: MessageType,
    pub version: u16,
    pub sender: IdRecord,
    pub send_time: f64,
    latent_process_time: Option<f64>,
}

impl MessageHeader {
    pub fn new(message_type: MessageType, sender: IdRecord, send_time: f64) -> Self {
        Self {
            message_type,
            version: MESSAGE_VERSION,
            sender,
            send_time,
            latent_process_time: None,
        }
    }

    pub fn set_latent_process_time(&mut self, time: f64) {
        self.latent_process_time = Some(time);
    }

    pub fn clear_latent_process_time(&mut self) {
        self.latent_process_time = None;
    }

    pub fn latent_process_time(&self) -> Option<f64> {
        self.latent_process_time
    }

    pub fn is_latent(&self) -> bool {
        self.latent_process_time.is_some()
    }

    /// 処理してよい時刻か
    ///
    /// 遅延指定なし、または `curr_time ≥ 遅延処理時刻`（許容誤差つき）なら真です。
    pub fn is_time_to_process(&self, curr_time: f64) -> bool {
        match self.latent_process_time {
            None => true,
            Some(latent) => numeric::greater_equal(curr_time, latent, numeric::DEFAULT_TOLERANCE),
        }
    }

    pub fn encode(&self, writer: &mut BufferWriter) {
        self.message_type.write(writer);
        writer.put_u16(self.version);
        writer.put_id(&self.sender);
        writer.put_f64(self.send_time);
        writer.put_optional_f64(self.latent_process_time);
    }

    pub fn decode(reader: &mut BufferReader<'_>) -> Result<Self, WireError> {
        let raw_type = reader.get_u16()?;
        let message_type = MessageType::from_tag(raw_type).ok_or(WireError::UnknownMessageType(raw_type))?;
        let version = reader.get_u16()?;
        if version != MESSAGE_VERSION {
            return Err(WireError::UnsupportedVersion(version));
        }
        Ok(Self {
            message_type,
            version,
            sender: reader.get_id()?,
            send_time: reader.get_f64()?,
            latent_process_time: reader.get_optional_f64()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_latent_message_is_always_ready() {
        let header = MessageHeader::new(MessageType::Assignment, IdRecord::new(1, 0), 10.0);
        assert!(!header.is_latent());
        assert!(header.is_time_to_process(0.0));
    }

    #[test]
    fn test_latent_time_uses_tolerance() {
        let mut header = MessageHeader::new(MessageType::Assignment, IdRecord::new(1, 0), 10.0);
        header.set_latent_process_time(12.3);

        assert!(!header.is_time_to_process(12.2));
        // 0.1刻みの積算誤差（12.299999999999...）でも処理される
        let stepped: f64 = (0..123).map(|_| 0.1).sum();
        assert!(stepped < 12.3);
        assert!(header.is_time_to_process(stepped));
        assert!(header.is_time_to_process(20.0));

        header.clear_latent_process_time();
        assert!(header.is_time_to_process(0.0));
    }

    #[test]
    fn test_header_rejects_unknown_version() {
        let header = MessageHeader::new(MessageType::Cue, IdRecord::new(1, 0), 1.0);
        let mut writer = BufferWriter::new();
        header.encode(&mut writer);
        let mut bytes = writer.into_bytes();
        bytes[3] = 9;
        assert_eq!(MessageHeader::decode(&mut BufferReader::new(&bytes)), Err(WireError::UnsupportedVersion(9)));

        bytes[1] = 77;
        assert_eq!(MessageHeader::decode(&mut BufferReader::new(&bytes)), Err(WireError::UnknownMessageType(77)));
    }
}
