use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::IadsError;
use crate::messages::header::{MessageHeader, MessageType};
use crate::messages::wire::{BufferReader, BufferWriter, WireError, WireTag};
use crate::messages::WireMessage;
use crate::models::{IdRecord, WeaponRef};

/// 射撃ドクトリン
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ShotDoctrine {
    #[serde(rename = "Shoot-1")]
    Shoot1,
    #[serde(rename = "Shoot-2")]
    Shoot2,
    #[default]
    #[serde(rename = "Shoot-Look-Shoot")]
    ShootLookShoot,
}

impl ShotDoctrine {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShotDoctrine::Shoot1 => "Shoot-1",
            ShotDoctrine::Shoot2 => "Shoot-2",
            ShotDoctrine::ShootLookShoot => "Shoot-Look-Shoot",
        }
    }

    /// 1割り当てで確保する弾数
    pub fn missiles_to_commit(&self) -> u32 {
        match self {
            ShotDoctrine::Shoot1 => 1,
            ShotDoctrine::Shoot2 | ShotDoctrine::ShootLookShoot => 2,
        }
    }

    /// ドクトリン変更に伴う弾数の増減（正なら追加消費）
    pub fn munitions_difference(from: ShotDoctrine, to: ShotDoctrine) -> i32 {
        to.missiles_to_commit() as i32 - from.missiles_to_commit() as i32
    }
}

impl fmt::Display for ShotDoctrine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShotDoctrine {
    type Err = IadsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Shoot-1" => Ok(ShotDoctrine::Shoot1),
            "Shoot-2" => Ok(ShotDoctrine::Shoot2),
            "Shoot-Look-Shoot" => Ok(ShotDoctrine::ShootLookShoot),
            other => Err(IadsError::InvalidShotDoctrine(other.to_string())),
        }
    }
}

impl WireTag for ShotDoctrine {
    const FIELD: &'static str = "shot doctrine";

    fn to_tag(self) -> u16 {
        match self {
            ShotDoctrine::Shoot1 => 0,
            ShotDoctrine::Shoot2 => 1,
            ShotDoctrine::ShootLookShoot => 2,
        }
    }

    fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(ShotDoctrine::Shoot1),
            1 => Some(ShotDoctrine::Shoot2),
            2 => Some(ShotDoctrine::ShootLookShoot),
            _ => None,
        }
    }
}

/// 割り当ての送信理由
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AssignmentReason {
    #[default]
    New,
    Retransmit,
    Update,
    Reassignment,
    Cancel,
}

impl WireTag for AssignmentReason {
    const FIELD: &'static str = "assignment reason";

    fn to_tag(self) -> u16 {
        match self {
            AssignmentReason::New => 0,
            AssignmentReason::Retransmit => 1,
            AssignmentReason::Update => 2,
            AssignmentReason::Reassignment => 3,
            AssignmentReason::Cancel => 4,
        }
    }

    fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(AssignmentReason::New),
            1 => Some(AssignmentReason::Retransmit),
            2 => Some(AssignmentReason::Update),
            3 => Some(AssignmentReason::Reassignment),
            4 => Some(AssignmentReason::Cancel),
            _ => None,
        }
    }
}

/// 割り当てメッセージ
///
/// 1トラックに対して1武器を割り当てる指令です。割り当て先ユニットは
/// `assigned_weapon.asset` です。
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentMessage {
    header: MessageHeader,
    pub assignment_time: f64,
    /// 全体で共有される参照トラックID
    pub reference_track: IdRecord,
    /// 割り当て元が保持するローカルトラックID
    pub local_track: IdRecord,
    pub initiating_unit: IdRecord,
    pub assigning_unit: IdRecord,
    pub assigned_weapon: WeaponRef,
    pub shot_doctrine: ShotDoctrine,
    pub max_firing_time_s: f64,
    pub reason: AssignmentReason,
}

impl AssignmentMessage {
    /// 新規割り当て（送信者が開始・割り当て元を兼ねる）
    pub fn new(sender: IdRecord, time: f64, track: IdRecord, weapon: WeaponRef, shot_doctrine: ShotDoctrine) -> Self {
        Self {
            header: MessageHeader::new(MessageType::Assignment, sender, time),
            assignment_time: time,
            reference_track: track,
            local_track: track,
            initiating_unit: sender,
            assigning_unit: sender,
            assigned_weapon: weapon,
            shot_doctrine,
            max_firing_time_s: 0.0,
            reason: AssignmentReason::New,
        }
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    pub fn assigned_unit(&self) -> IdRecord {
        self.assigned_weapon.asset
    }

    /// 取り消し指令として複製
    pub fn to_cancel(&self, sender: IdRecord, time: f64) -> Self {
        let mut cancel = self.clone();
        cancel.header = MessageHeader::new(MessageType::Assignment, sender, time);
        cancel.reason = AssignmentReason::Cancel;
        cancel
    }
}

impl WireMessage for AssignmentMessage {
    const MESSAGE_TYPE: MessageType = MessageType::Assignment;

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn encode_body(&self, writer: &mut BufferWriter) -> Result<(), WireError> {
        writer.put_f64(self.assignment_time);
        writer.put_id(&self.reference_track);
        writer.put_id(&self.local_track);
        writer.put_id(&self.initiating_unit);
        writer.put_id(&self.assigning_unit);
        writer.put_id(&self.assigned_weapon.asset);
        writer.put_id(&self.assigned_weapon.weapon);
        self.shot_doctrine.write(writer);
        writer.put_f64(self.max_firing_time_s);
        self.reason.write(writer);
        Ok(())
    }

    fn decode_body(header: MessageHeader, reader: &mut BufferReader<'_>) -> Result<Self, WireError> {
        Ok(Self {
            header,
            assignment_time: reader.get_f64()?,
            reference_track: reader.get_id()?,
            local_track: reader.get_id()?,
            initiating_unit: reader.get_id()?,
            assigning_unit: reader.get_id()?,
            assigned_weapon: WeaponRef { asset: reader.get_id()?, weapon: reader.get_id()? },
            shot_doctrine: ShotDoctrine::read(reader)?,
            max_firing_time_s: reader.get_f64()?,
            reason: AssignmentReason::read(reader)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AssignmentMessage {
        let mut msg = AssignmentMessage::new(
            IdRecord::new(1, 0),
            12.5,
            IdRecord::new(900, 7),
            WeaponRef { asset: IdRecord::new(20, 0), weapon: IdRecord::new(20, 2) },
            ShotDoctrine::ShootLookShoot,
        );
        msg.max_firing_time_s = 360.0;
        msg
    }

    #[test]
    fn test_shot_doctrine_strings() {
        for doctrine in [ShotDoctrine::Shoot1, ShotDoctrine::Shoot2, ShotDoctrine::ShootLookShoot] {
            assert_eq!(doctrine.as_str().parse::<ShotDoctrine>().unwrap(), doctrine);
        }
        assert_eq!(
            "Shoot-3".parse::<ShotDoctrine>(),
            Err(IadsError::InvalidShotDoctrine("Shoot-3".into()))
        );
    }

    #[test]
    fn test_missiles_to_commit_and_difference() {
        assert_eq!(ShotDoctrine::Shoot1.missiles_to_commit(), 1);
        assert_eq!(ShotDoctrine::Shoot2.missiles_to_commit(), 2);
        assert_eq!(ShotDoctrine::ShootLookShoot.missiles_to_commit(), 2);
        assert_eq!(ShotDoctrine::munitions_difference(ShotDoctrine::Shoot1, ShotDoctrine::Shoot2), 1);
        assert_eq!(ShotDoctrine::munitions_difference(ShotDoctrine::ShootLookShoot, ShotDoctrine::Shoot1), -1);
    }

    #[test]
    fn test_shot_doctrine_yaml_names() {
        let doctrine: ShotDoctrine = serde_yaml::from_str("Shoot-Look-Shoot").unwrap();
        assert_eq!(doctrine, ShotDoctrine::ShootLookShoot);
        assert!(serde_yaml::from_str::<ShotDoctrine>("Shoot-Twice").is_err());
    }

    #[test]
    fn test_assignment_wire_layout() {
        let msg = sample();
        let bytes = msg.encode().unwrap();
        // ヘッダ 29 バイト + 本体 8 + 6*8 + 2 + 8 + 2
        assert_eq!(bytes.len(), 29 + 68);
        assert_eq!(&bytes[..4], &[0x00, 0x01, 0x00, 0x01]);
        assert_eq!(AssignmentMessage::decode(&bytes).unwrap(), msg);
    }

    #[test]
    fn test_cancel_keeps_assignment_identity() {
        let msg = sample();
        let cancel = msg.to_cancel(IdRecord::new(1, 0), 40.0);
        assert_eq!(cancel.reason, AssignmentReason::Cancel);
        assert_eq!(cancel.reference_track, msg.reference_track);
        assert_eq!(cancel.assigned_weapon, msg.assigned_weapon);
        assert_eq!(cancel.header().send_time, 40.0);
    }
}
