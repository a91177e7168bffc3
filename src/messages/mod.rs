//! # Messages モジュール
//!
//! 戦闘管理が送受信するメッセージと、そのビッグエンディアンのワイヤ形式を
//! 定義します。
//!
//! ## 主要機能
//! - 共通ヘッダ（送信者・送信時刻・遅延処理時刻）
//! - 割り当て / 割り当てACK（ステータス状態機械）
//! - キュー / キューACK
//! - 戦闘ステータス（アセット・武器資源の報告）

pub mod wire;
pub mod header;
pub mod assignment;
pub mod assignment_ack;
pub mod cue;
pub mod combat_status;

pub use wire::{BufferReader, BufferWriter, WireError, WireTag};
pub use header::{MessageHeader, MessageType, MESSAGE_VERSION};
pub use assignment::{AssignmentMessage, AssignmentReason, ShotDoctrine};
pub use assignment_ack::{AssignmentAckMessage, AssignmentStatus, HavcoReportingStyle, SystemicScope};
pub use cue::{CueAckMessage, CueMessage, CueReason, CueStatus};
pub use combat_status::{CombatStatusMessage, SystemStatus, WeaponStatus};

/// ワイヤ形式で送受信できるメッセージ
pub trait WireMessage: Sized {
    const MESSAGE_TYPE: MessageType;

    fn header(&self) -> &MessageHeader;

    fn encode_body(&self, writer: &mut BufferWriter) -> Result<(), WireError>;

    fn decode_body(header: MessageHeader, reader: &mut BufferReader<'_>) -> Result<Self, WireError>;

    /// ヘッダ + 本体をバイト列へ
    fn encode(&self) -> Result<Vec<u8>, WireError> {
        let mut writer = BufferWriter::new();
        self.header().encode(&mut writer);
        self.encode_body(&mut writer)?;
        Ok(writer.into_bytes())
    }

    /// バイト列から復号（種別・版数を検査）
    fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let mut reader = BufferReader::new(bytes);
        let header = MessageHeader::decode(&mut reader)?;
        if header.message_type != Self::MESSAGE_TYPE {
            return Err(WireError::UnexpectedMessageType {
                expected: Self::MESSAGE_TYPE.to_tag(),
                found: header.message_type.to_tag(),
            });
        }
        Self::decode_body(header, &mut reader)
    }
}

/// 受信メッセージ（種別で振り分け）
#[derive(Debug, Clone, PartialEq)]
pub enum IadsMessage {
    Assignment(AssignmentMessage),
    AssignmentAck(AssignmentAckMessage),
    Cue(CueMessage),
    CueAck(CueAckMessage),
    CombatStatus(CombatStatusMessage),
}

impl IadsMessage {
    pub fn header(&self) -> &MessageHeader {
        match self {
            IadsMessage::Assignment(m) => m.header(),
            IadsMessage::AssignmentAck(m) => m.header(),
            IadsMessage::Cue(m) => m.header(),
            IadsMessage::CueAck(m) => m.header(),
            IadsMessage::CombatStatus(m) => m.header(),
        }
    }

    pub fn is_time_to_process(&self, curr_time: f64) -> bool {
        self.header().is_time_to_process(curr_time)
    }

    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        match self {
            IadsMessage::Assignment(m) => m.encode(),
            IadsMessage::AssignmentAck(m) => m.encode(),
            IadsMessage::Cue(m) => m.encode(),
            IadsMessage::CueAck(m) => m.encode(),
            IadsMessage::CombatStatus(m) => m.encode(),
        }
    }

    /// 先頭の種別タグを覗いて該当メッセージとして復号
    pub fn decode(bytes: &[u8]) -> Result<Self, WireError> {
        let raw = BufferReader::new(bytes).peek_u16()?;
        match MessageType::from_tag(raw) {
            Some(MessageType::Assignment) => AssignmentMessage::decode(bytes).map(IadsMessage::Assignment),
            Some(MessageType::AssignmentAck) => AssignmentAckMessage::decode(bytes).map(IadsMessage::AssignmentAck),
            Some(MessageType::Cue) => CueMessage::decode(bytes).map(IadsMessage::Cue),
            Some(MessageType::CueAck) => CueAckMessage::decode(bytes).map(IadsMessage::CueAck),
            Some(MessageType::CombatStatus) => CombatStatusMessage::decode(bytes).map(IadsMessage::CombatStatus),
            None => Err(WireError::UnknownMessageType(raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{IdRecord, WeaponRef};

    #[test]
    fn test_dispatch_by_message_type() {
        let assignment = AssignmentMessage::new(
            IdRecord::new(1, 0),
            5.0,
            IdRecord::new(900, 3),
            WeaponRef { asset: IdRecord::new(20, 0), weapon: IdRecord::new(20, 1) },
            ShotDoctrine::Shoot2,
        );
        let bytes = assignment.encode().unwrap();
        match IadsMessage::decode(&bytes).unwrap() {
            IadsMessage::Assignment(decoded) => assert_eq!(decoded, assignment),
            other => panic!("unexpected message {:?}", other),
        }

        // 種別の違うメッセージとしては復号できない
        assert_eq!(
            CueMessage::decode(&bytes),
            Err(WireError::UnexpectedMessageType { expected: 3, found: 1 })
        );
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert_eq!(IadsMessage::decode(&[0x00, 0x63, 0x00, 0x01]), Err(WireError::UnknownMessageType(0x63)));
        assert!(matches!(IadsMessage::decode(&[0x00]), Err(WireError::Underrun { .. })));
    }
}
