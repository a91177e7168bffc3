use std::fmt;

use crate::messages::header::{MessageHeader, MessageType};
use crate::messages::wire::{BufferReader, BufferWriter, WireError, WireTag};
use crate::messages::WireMessage;
use crate::models::IdRecord;

/// キュー指令の理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CueReason {
    #[default]
    New,
    Cancel,
}

impl WireTag for CueReason {
    const FIELD: &'static str = "cue reason";

    fn to_tag(self) -> u16 {
        match self {
            CueReason::New => 0,
            CueReason::Cancel => 1,
        }
    }

    fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(CueReason::New),
            1 => Some(CueReason::Cancel),
            _ => None,
        }
    }
}

/// キューACKのステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CueStatus {
    Wilco,
    Cantco,
    Searching,
    Tracking,
}

impl CueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CueStatus::Wilco => "Wilco",
            CueStatus::Cantco => "CANTCO",
            CueStatus::Searching => "Searching",
            CueStatus::Tracking => "Tracking",
        }
    }
}

impl fmt::Display for CueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl WireTag for CueStatus {
    const FIELD: &'static str = "cue status";

    fn to_tag(self) -> u16 {
        match self {
            CueStatus::Wilco => 0,
            CueStatus::Cantco => 1,
            CueStatus::Searching => 2,
            CueStatus::Tracking => 3,
        }
    }

    fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(CueStatus::Wilco),
            1 => Some(CueStatus::Cantco),
            2 => Some(CueStatus::Searching),
            3 => Some(CueStatus::Tracking),
            _ => None,
        }
    }
}

/// センサーキュー指令
///
/// 割り当て先アセットの追尾レーダへ目標を渡します。
#[derive(Debug, Clone, PartialEq)]
pub struct CueMessage {
    header: MessageHeader,
    pub cue_time: f64,
    pub reference_track: IdRecord,
    pub local_track: IdRecord,
    pub initiating_unit: IdRecord,
    pub cued_unit: IdRecord,
    pub cued_sensor: IdRecord,
    pub reason: CueReason,
}

impl CueMessage {
    pub fn new(sender: IdRecord, time: f64, track: IdRecord, cued_unit: IdRecord, cued_sensor: IdRecord) -> Self {
        Self {
            header: MessageHeader::new(MessageType::Cue, sender, time),
            cue_time: time,
            reference_track: track,
            local_track: track,
            initiating_unit: sender,
            cued_unit,
            cued_sensor,
            reason: CueReason::New,
        }
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }
}

impl WireMessage for CueMessage {
    const MESSAGE_TYPE: MessageType = MessageType::Cue;

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn encode_body(&self, writer: &mut BufferWriter) -> Result<(), WireError> {
        writer.put_f64(self.cue_time);
        writer.put_id(&self.reference_track);
        writer.put_id(&self.local_track);
        writer.put_id(&self.initiating_unit);
        writer.put_id(&self.cued_unit);
        writer.put_id(&self.cued_sensor);
        self.reason.write(writer);
        Ok(())
    }

    fn decode_body(header: MessageHeader, reader: &mut BufferReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            cue_time: reader.get_f64()?,
            reference_track: reader.get_id()?,
            local_track: reader.get_id()?,
            initiating_unit: reader.get_id()?,
            cued_unit: reader.get_id()?,
            cued_sensor: reader.get_id()?,
            reason: CueReason::read(reader)?,
        })
    }
}

/// キューACK
#[derive(Debug, Clone, PartialEq)]
pub struct CueAckMessage {
    header: MessageHeader,
    pub ack_time: f64,
    pub reference_track: IdRecord,
    pub cued_unit: IdRecord,
    pub cued_sensor: IdRecord,
    pub status: CueStatus,
}

impl CueAckMessage {
    pub fn for_cue(cue: &CueMessage, status: CueStatus, time: f64) -> Self {
        Self {
            header: MessageHeader::new(MessageType::CueAck, cue.cued_unit, time),
            ack_time: time,
            reference_track: cue.reference_track,
            cued_unit: cue.cued_unit,
            cued_sensor: cue.cued_sensor,
            status,
        }
    }
}

impl WireMessage for CueAckMessage {
    const MESSAGE_TYPE: MessageType = MessageType::CueAck;

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn encode_body(&self, writer: &mut BufferWriter) -> Result<(), WireError> {
        writer.put_f64(self.ack_time);
        writer.put_id(&self.reference_track);
        writer.put_id(&self.cued_unit);
        writer.put_id(&self.cued_sensor);
        self.status.write(writer);
        Ok(())
    }

    fn decode_body(header: MessageHeader, reader: &mut BufferReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            ack_time: reader.get_f64()?,
            reference_track: reader.get_id()?,
            cued_unit: reader.get_id()?,
            cued_sensor: reader.get_id()?,
            status: CueStatus::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_ack_refers_back_to_cue() {
        let cue = CueMessage::new(IdRecord::new(1, 0), 8.0, IdRecord::new(900, 1), IdRecord::new(20, 0), IdRecord::new(20, 9));
        let ack = CueAckMessage::for_cue(&cue, CueStatus::Tracking, 9.5);
        assert_eq!(ack.header().sender, cue.cued_unit);
        assert_eq!(ack.reference_track, cue.reference_track);
        assert_eq!(CueAckMessage::decode(&ack.encode().unwrap()).unwrap(), ack);
    }

    #[test]
    fn test_invalid_cue_status_tag() {
        let cue = CueMessage::new(IdRecord::new(1, 0), 8.0, IdRecord::new(900, 1), IdRecord::new(20, 0), IdRecord::new(20, 9));
        let ack = CueAckMessage::for_cue(&cue, CueStatus::Wilco, 9.0);
        let mut bytes = ack.encode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] = 42;
        assert_eq!(
            CueAckMessage::decode(&bytes),
            Err(WireError::InvalidTag { field: "cue status", tag: 42 })
        );
    }
}
