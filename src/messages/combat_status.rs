use tracing::{debug, warn};

use crate::messages::header::{MessageHeader, MessageType};
use crate::messages::wire::{BufferReader, BufferWriter, WireError, WireTag};
use crate::messages::WireMessage;
use crate::models::{AssetRecord, IdRecord, PositionRecord, Vector3};

pub use crate::models::SystemStatus;

impl WireTag for SystemStatus {
    const FIELD: &'static str = "system status";

    fn to_tag(self) -> u16 {
        match self {
            SystemStatus::White => 0,
            SystemStatus::Green => 1,
            SystemStatus::Yellow => 2,
            SystemStatus::Red => 3,
        }
    }

    fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(SystemStatus::White),
            1 => Some(SystemStatus::Green),
            2 => Some(SystemStatus::Yellow),
            3 => Some(SystemStatus::Red),
            _ => None,
        }
    }
}

/// 武器1基分の資源報告
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeaponStatus {
    pub weapon: IdRecord,
    pub munitions_prepped: u32,
    pub total_munitions: u32,
    pub allocated_fire_channels: u32,
    pub total_fire_channels: u32,
}

/// 戦闘ステータス（アセットの位置・稼働状態・武器資源の定期報告）
#[derive(Debug, Clone, PartialEq)]
pub struct CombatStatusMessage {
    header: MessageHeader,
    pub status_time: f64,
    pub asset: IdRecord,
    pub lat_rad: f64,
    pub lon_rad: f64,
    pub alt_m: f64,
    /// ECEF速度（m/s）
    pub velocity: Vector3,
    pub system_status: SystemStatus,
    pub max_assignments: u32,
    pub current_assignments: u32,
    pub assignment_delay_s: f64,
    pub execution_delay_s: f64,
    pub weapons: Vec<WeaponStatus>,
}

impl CombatStatusMessage {
    /// アセットの現在値から報告を作成
    pub fn from_asset(asset: &AssetRecord, time: f64) -> Self {
        let weapons = asset
            .weapons()
            .iter()
            .map(|w| WeaponStatus {
                weapon: w.id,
                munitions_prepped: w.estimated_munitions_prepped(),
                total_munitions: w.estimated_total_munitions(),
                allocated_fire_channels: w.estimated_allocated_fire_channels(),
                total_fire_channels: w.total_fire_channels(),
            })
            .collect();

        Self {
            header: MessageHeader::new(MessageType::CombatStatus, asset.id, time),
            status_time: time,
            asset: asset.id,
            lat_rad: asset.position.lat_rad(),
            lon_rad: asset.position.lon_rad(),
            alt_m: asset.position.alt_m(),
            velocity: asset.velocity,
            system_status: asset.system_status,
            max_assignments: asset.max_assignments,
            current_assignments: asset.assignments_in_progress(),
            assignment_delay_s: asset.assignment_delay_s,
            execution_delay_s: asset.execution_delay_s,
            weapons,
        }
    }

    /// 報告内容を認識上のアセットへ反映
    ///
    /// 未登録の武器の報告は警告して読み飛ばします。
    pub fn apply_to(&self, asset: &mut AssetRecord) {
        asset.position = PositionRecord::from_lla(self.lat_rad, self.lon_rad, self.alt_m);
        asset.velocity = self.velocity;
        asset.status_time = self.status_time;
        asset.system_status = self.system_status;
        asset.max_assignments = self.max_assignments;
        asset.set_reported_assignments(self.current_assignments);
        asset.assignment_delay_s = self.assignment_delay_s;
        asset.execution_delay_s = self.execution_delay_s;

        for report in &self.weapons {
            match asset.weapon_mut(report.weapon) {
                Some(weapon) => weapon.set_reported_resources(
                    report.munitions_prepped,
                    report.total_munitions,
                    report.allocated_fire_channels,
                    report.total_fire_channels,
                ),
                None => warn!(asset = %self.asset, weapon = %report.weapon, "未登録の武器の状況報告を無視"),
            }
        }
        debug!(asset = %self.asset, time = self.status_time, weapons = self.weapons.len(), "戦闘ステータスを反映");
    }
}

impl WireMessage for CombatStatusMessage {
    const MESSAGE_TYPE: MessageType = MessageType::CombatStatus;

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn encode_body(&self, writer: &mut BufferWriter) -> Result<(), WireError> {
        writer.put_f64(self.status_time);
        writer.put_id(&self.asset);
        writer.put_f64(self.lat_rad);
        writer.put_f64(self.lon_rad);
        writer.put_f64(self.alt_m);
        writer.put_f64(self.velocity.x);
        writer.put_f64(self.velocity.y);
        writer.put_f64(self.velocity.z);
        self.system_status.write(writer);
        writer.put_u32(self.max_assignments);
        writer.put_u32(self.current_assignments);
        writer.put_f64(self.assignment_delay_s);
        writer.put_f64(self.execution_delay_s);

        let count = u16::try_from(self.weapons.len()).map_err(|_| WireError::TooManyEntries(self.weapons.len()))?;
        writer.put_u16(count);
        for w in &self.weapons {
            writer.put_id(&w.weapon);
            writer.put_u32(w.munitions_prepped);
            writer.put_u32(w.total_munitions);
            writer.put_u32(w.allocated_fire_channels);
            writer.put_u32(w.total_fire_channels);
        }
        Ok(())
    }

    fn decode_body(header: MessageHeader, reader: &mut BufferReader<'_>) -> Result<Self, WireError> {
        let status_time = reader.get_f64()?;
        let asset = reader.get_id()?;
        let lat_rad = reader.get_f64()?;
        let lon_rad = reader.get_f64()?;
        let alt_m = reader.get_f64()?;
        let velocity = Vector3::new(reader.get_f64()?, reader.get_f64()?, reader.get_f64()?);
        let system_status = SystemStatus::read(reader)?;
        let max_assignments = reader.get_u32()?;
        let current_assignments = reader.get_u32()?;
        let assignment_delay_s = reader.get_f64()?;
        let execution_delay_s = reader.get_f64()?;

        let count = reader.get_u16()?;
        let mut weapons = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            weapons.push(WeaponStatus {
                weapon: reader.get_id()?,
                munitions_prepped: reader.get_u32()?,
                total_munitions: reader.get_u32()?,
                allocated_fire_channels: reader.get_u32()?,
                total_fire_channels: reader.get_u32()?,
            });
        }

        Ok(Self {
            header,
            status_time,
            asset,
            lat_rad,
            lon_rad,
            alt_m,
            velocity,
            system_status,
            max_assignments,
            current_assignments,
            assignment_delay_s,
            execution_delay_s,
            weapons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{WeaponCategory, WeaponRecord};

    fn battery() -> AssetRecord {
        let mut asset = AssetRecord::new(IdRecord::new(20, 0), "BTRY", PositionRecord::from_lla_deg(35.0, 139.0, 10.0));
        asset.max_assignments = 3;
        asset.add_weapon(WeaponRecord::new(IdRecord::new(20, 1), IdRecord::default(), WeaponCategory::Sam, 8, 4));
        asset
    }

    #[test]
    fn test_status_updates_perceived_asset() {
        let mut truth = battery();
        truth.status_time = 50.0;
        truth.system_status = SystemStatus::Yellow;
        truth.weapon_mut(IdRecord::new(20, 1)).unwrap().increment_estimations(2);
        truth.increment_assignments();

        let report = CombatStatusMessage::from_asset(&truth, 50.0);
        let decoded = CombatStatusMessage::decode(&report.encode().unwrap()).unwrap();
        assert_eq!(decoded, report);

        let mut perceived = battery();
        decoded.apply_to(&mut perceived);
        assert_eq!(perceived.status_time, 50.0);
        assert_eq!(perceived.system_status, SystemStatus::Yellow);
        assert_eq!(perceived.assignments_in_progress(), 1);
        let weapon = perceived.weapon(IdRecord::new(20, 1)).unwrap();
        assert_eq!(weapon.estimated_munitions_prepped(), 6);
        assert_eq!(weapon.estimated_allocated_fire_channels(), 1);
    }

    #[test]
    fn test_unknown_weapon_report_is_skipped() {
        let truth = battery();
        let mut report = CombatStatusMessage::from_asset(&truth, 5.0);
        report.weapons.push(WeaponStatus {
            weapon: IdRecord::new(20, 7),
            munitions_prepped: 1,
            total_munitions: 1,
            allocated_fire_channels: 0,
            total_fire_channels: 1,
        });

        let mut perceived = battery();
        report.apply_to(&mut perceived);
        assert_eq!(perceived.weapons().len(), 1);
    }
}
