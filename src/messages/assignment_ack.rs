//! # 割り当てACK
//!
//! 割り当ての受領から交戦結果までのステータス遷移を記録します。
//!
//! ## 状態遷移
//! `Unacknowledged → Wilco → Committed → Cue TAR/TTR → Searching → Tracking → Firing → Miss/Kill`
//! を基本とし、どの段階からも `CANTCO` / `Cancelled` で終了し得ます。
//! 終端ステータス（Kill, Cancelled, Havco Success/Failure, CANTCO）の後は
//! いかなる遷移も受け付けません。各遷移時刻はステータスごとに記録され、
//! 同じ非終端ステータスへの再遷移は時刻を上書きします。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{IadsError, Result};
use crate::messages::assignment::{AssignmentMessage, ShotDoctrine};
use crate::messages::header::{MessageHeader, MessageType};
use crate::messages::wire::{BufferReader, BufferWriter, WireError, WireTag};
use crate::messages::WireMessage;
use crate::models::{IdRecord, WeaponRef};

const ALL_STATUSES: [AssignmentStatus; 18] = [
    AssignmentStatus::Unacknowledged,
    AssignmentStatus::Wilco,
    AssignmentStatus::Committed,
    AssignmentStatus::CueTar,
    AssignmentStatus::CueTtr,
    AssignmentStatus::TarSearching,
    AssignmentStatus::TtrSearching,
    AssignmentStatus::TarTracking,
    AssignmentStatus::TtrTracking,
    AssignmentStatus::Firing,
    AssignmentStatus::Miss,
    AssignmentStatus::ChangedAssignedUnit,
    AssignmentStatus::UpdatedShotDoctrine,
    AssignmentStatus::Kill,
    AssignmentStatus::Cancelled,
    AssignmentStatus::HavcoSuccess,
    AssignmentStatus::HavcoFailure,
    AssignmentStatus::Cantco,
];

/// 割り当てステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum AssignmentStatus {
    #[default]
    Unacknowledged,
    Wilco,
    Committed,
    CueTar,
    CueTtr,
    TarSearching,
    TtrSearching,
    TarTracking,
    TtrTracking,
    Firing,
    Miss,
    ChangedAssignedUnit,
    UpdatedShotDoctrine,
    Kill,
    Cancelled,
    HavcoSuccess,
    HavcoFailure,
    Cantco,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Unacknowledged => "Unacknowledged",
            AssignmentStatus::Wilco => "Wilco",
            AssignmentStatus::Committed => "Committed",
            AssignmentStatus::CueTar => "Cue TAR",
            AssignmentStatus::CueTtr => "Cue TTR",
            AssignmentStatus::TarSearching => "TAR Searching",
            AssignmentStatus::TtrSearching => "TTR Searching",
            AssignmentStatus::TarTracking => "TAR Tracking",
            AssignmentStatus::TtrTracking => "TTR Tracking",
            AssignmentStatus::Firing => "Firing",
            AssignmentStatus::Miss => "Miss",
            AssignmentStatus::ChangedAssignedUnit => "Changed Assigned Unit",
            AssignmentStatus::UpdatedShotDoctrine => "Updated Shot Doctrine",
            AssignmentStatus::Kill => "Kill",
            AssignmentStatus::Cancelled => "Cancelled",
            AssignmentStatus::HavcoSuccess => "Havco Success",
            AssignmentStatus::HavcoFailure => "Havco Failure",
            AssignmentStatus::Cantco => "CANTCO",
        }
    }

    /// 終端ステータスか
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Kill
                | AssignmentStatus::Cancelled
                | AssignmentStatus::HavcoSuccess
                | AssignmentStatus::HavcoFailure
                | AssignmentStatus::Cantco
        )
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = IadsError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ALL_STATUSES
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| IadsError::InvalidStatus(s.to_string()))
    }
}

impl Serialize for AssignmentStatus {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AssignmentStatus {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

impl WireTag for AssignmentStatus {
    const FIELD: &'static str = "assignment status";

    fn to_tag(self) -> u16 {
        self as u16
    }

    fn from_tag(tag: u16) -> Option<Self> {
        ALL_STATUSES.get(usize::from(tag)).copied()
    }
}

/// CANTCOの適用範囲
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemicScope {
    /// 当該トラックに対してのみ除外
    Local,
    /// 以後の全トラックに対して除外
    Global,
}

impl WireTag for SystemicScope {
    const FIELD: &'static str = "systemic scope";

    fn to_tag(self) -> u16 {
        match self {
            SystemicScope::Local => 0,
            SystemicScope::Global => 1,
        }
    }

    fn from_tag(tag: u16) -> Option<Self> {
        match tag {
            0 => Some(SystemicScope::Local),
            1 => Some(SystemicScope::Global),
            _ => None,
        }
    }
}

/// HAVCO報告方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HavcoReportingStyle {
    OnLaunch,
    OnDetonation,
    #[default]
    OnKill,
}

impl HavcoReportingStyle {
    /// 交戦イベントを報告ステータスへ変換
    ///
    /// 変換対象でないイベントはそのまま返します。
    pub fn map_event(&self, event: AssignmentStatus) -> AssignmentStatus {
        match (self, event) {
            (HavcoReportingStyle::OnLaunch, AssignmentStatus::Firing) => AssignmentStatus::HavcoSuccess,
            (HavcoReportingStyle::OnDetonation, AssignmentStatus::Miss | AssignmentStatus::Kill) => {
                AssignmentStatus::HavcoSuccess
            }
            (HavcoReportingStyle::OnKill, AssignmentStatus::Kill) => AssignmentStatus::HavcoSuccess,
            (HavcoReportingStyle::OnKill, AssignmentStatus::Miss) => AssignmentStatus::HavcoFailure,
            (_, other) => other,
        }
    }
}

/// 割り当てACKメッセージ
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentAckMessage {
    header: MessageHeader,
    pub ack_time: f64,
    pub reference_track: IdRecord,
    pub initiating_unit: IdRecord,
    pub assigning_unit: IdRecord,
    pub assigned_weapon: WeaponRef,
    pub salvos_fired: u32,
    status: AssignmentStatus,
    status_times: BTreeMap<AssignmentStatus, f64>,
    cantco_reason: Option<String>,
    systemic_scope: Option<SystemicScope>,
    overriding_weapon: Option<WeaponRef>,
    updated_shot_doctrine: Option<ShotDoctrine>,
}

impl AssignmentAckMessage {
    /// 割り当てに対する未応答のACKを作成
    pub fn for_assignment(assignment: &AssignmentMessage, sender: IdRecord, time: f64) -> Self {
        let mut status_times = BTreeMap::new();
        status_times.insert(AssignmentStatus::Unacknowledged, time);
        Self {
            header: MessageHeader::new(MessageType::AssignmentAck, sender, time),
            ack_time: time,
            reference_track: assignment.reference_track,
            initiating_unit: assignment.initiating_unit,
            assigning_unit: assignment.assigning_unit,
            assigned_weapon: assignment.assigned_weapon,
            salvos_fired: 0,
            status: AssignmentStatus::Unacknowledged,
            status_times,
            cantco_reason: None,
            systemic_scope: None,
            overriding_weapon: None,
            updated_shot_doctrine: None,
        }
    }

    pub fn header_mut(&mut self) -> &mut MessageHeader {
        &mut self.header
    }

    pub fn status(&self) -> AssignmentStatus {
        self.status
    }

    pub fn status_time(&self, status: AssignmentStatus) -> Option<f64> {
        self.status_times.get(&status).copied()
    }

    pub fn status_times(&self) -> &BTreeMap<AssignmentStatus, f64> {
        &self.status_times
    }

    pub fn assigned_unit(&self) -> IdRecord {
        self.assigned_weapon.asset
    }

    /// ステータス遷移
    ///
    /// 終端ステータス後の遷移は `TerminalStatus` エラーになります。
    pub fn set_status(&mut self, status: AssignmentStatus, time: f64) -> Result<()> {
        if self.status.is_terminal() {
            warn!(
                track = %self.reference_track,
                current = %self.status,
                requested = %status,
                "終端ステータス後の遷移を拒否"
            );
            return Err(IadsError::TerminalStatus {
                track: self.reference_track,
                current: self.status.to_string(),
                requested: status.to_string(),
            });
        }
        self.status = status;
        self.status_times.insert(status, time);
        self.ack_time = time;
        self.cantco_reason = None;
        self.systemic_scope = None;
        self.overriding_weapon = None;
        self.updated_shot_doctrine = None;
        Ok(())
    }

    /// CANTCO（理由と、システム的な除外範囲）
    pub fn set_cantco(&mut self, reason: impl Into<String>, scope: Option<SystemicScope>, time: f64) -> Result<()> {
        self.set_status(AssignmentStatus::Cantco, time)?;
        self.cantco_reason = Some(reason.into());
        self.systemic_scope = scope;
        Ok(())
    }

    /// 割り当て先ユニットの変更
    pub fn set_changed_assigned_unit(&mut self, new_weapon: WeaponRef, time: f64) -> Result<()> {
        self.set_status(AssignmentStatus::ChangedAssignedUnit, time)?;
        self.overriding_weapon = Some(new_weapon);
        Ok(())
    }

    /// 射撃ドクトリンの変更
    pub fn set_updated_shot_doctrine(&mut self, doctrine: ShotDoctrine, time: f64) -> Result<()> {
        self.set_status(AssignmentStatus::UpdatedShotDoctrine, time)?;
        self.updated_shot_doctrine = Some(doctrine);
        Ok(())
    }

    /// 交戦イベントを報告方式に従って記録し、記録したステータスを返す
    pub fn report_engagement(
        &mut self,
        event: AssignmentStatus,
        style: HavcoReportingStyle,
        time: f64,
    ) -> Result<AssignmentStatus> {
        let reported = style.map_event(event);
        if event == AssignmentStatus::Firing {
            self.salvos_fired += 1;
        }
        self.set_status(reported, time)?;
        Ok(reported)
    }

    /// CANTCO時のみ有効
    pub fn cantco_reason(&self) -> Option<&str> {
        match self.status {
            AssignmentStatus::Cantco => self.cantco_reason.as_deref(),
            _ => None,
        }
    }

    /// CANTCO時のみ有効
    pub fn systemic_scope(&self) -> Option<SystemicScope> {
        match self.status {
            AssignmentStatus::Cantco => self.systemic_scope,
            _ => None,
        }
    }

    pub fn is_systemic_cantco(&self) -> bool {
        self.systemic_scope().is_some()
    }

    /// CHANGED_ASSIGNED_UNIT時のみ有効
    pub fn overriding_weapon(&self) -> Option<WeaponRef> {
        match self.status {
            AssignmentStatus::ChangedAssignedUnit => self.overriding_weapon,
            _ => None,
        }
    }

    /// UPDATED_SHOT_DOCTRINE時のみ有効
    pub fn updated_shot_doctrine(&self) -> Option<ShotDoctrine> {
        match self.status {
            AssignmentStatus::UpdatedShotDoctrine => self.updated_shot_doctrine,
            _ => None,
        }
    }

    /// 受信したACKで保持中の記録を更新
    ///
    /// 遷移時刻は統合し、ステータス固有の付帯情報は受信側の値に置き換えます。
    pub fn apply_update(&mut self, incoming: &AssignmentAckMessage) -> Result<()> {
        if self.status.is_terminal() {
            return Err(IadsError::TerminalStatus {
                track: self.reference_track,
                current: self.status.to_string(),
                requested: incoming.status.to_string(),
            });
        }
        self.header = incoming.header.clone();
        self.ack_time = incoming.ack_time;
        self.status = incoming.status;
        for (status, time) in &incoming.status_times {
            self.status_times.insert(*status, *time);
        }
        self.salvos_fired = self.salvos_fired.max(incoming.salvos_fired);
        self.cantco_reason = incoming.cantco_reason.clone();
        self.systemic_scope = incoming.systemic_scope;
        self.overriding_weapon = incoming.overriding_weapon;
        self.updated_shot_doctrine = incoming.updated_shot_doctrine;
        Ok(())
    }
}

impl WireMessage for AssignmentAckMessage {
    const MESSAGE_TYPE: MessageType = MessageType::AssignmentAck;

    fn header(&self) -> &MessageHeader {
        &self.header
    }

    fn encode_body(&self, writer: &mut BufferWriter) -> std::result::Result<(), WireError> {
        writer.put_f64(self.ack_time);
        writer.put_id(&self.reference_track);
        writer.put_id(&self.initiating_unit);
        writer.put_id(&self.assigning_unit);
        writer.put_id(&self.assigned_weapon.asset);
        writer.put_id(&self.assigned_weapon.weapon);
        self.status.write(writer);
        writer.put_u32(self.salvos_fired);

        // 遷移時刻は最大18件
        writer.put_u16(self.status_times.len() as u16);
        for (status, time) in &self.status_times {
            status.write(writer);
            writer.put_f64(*time);
        }

        writer.put_bool(self.cantco_reason.is_some());
        if let Some(reason) = &self.cantco_reason {
            writer.put_string(reason)?;
        }
        writer.put_bool(self.systemic_scope.is_some());
        writer.put_u16(self.systemic_scope.map_or(0, WireTag::to_tag));
        writer.put_bool(self.overriding_weapon.is_some());
        let overriding = self.overriding_weapon.unwrap_or_default();
        writer.put_id(&overriding.asset);
        writer.put_id(&overriding.weapon);
        writer.put_bool(self.updated_shot_doctrine.is_some());
        writer.put_u16(self.updated_shot_doctrine.map_or(0, WireTag::to_tag));
        Ok(())
    }

    fn decode_body(header: MessageHeader, reader: &mut BufferReader<'_>) -> std::result::Result<Self, WireError> {
        let ack_time = reader.get_f64()?;
        let reference_track = reader.get_id()?;
        let initiating_unit = reader.get_id()?;
        let assigning_unit = reader.get_id()?;
        let assigned_weapon = WeaponRef { asset: reader.get_id()?, weapon: reader.get_id()? };
        let status = AssignmentStatus::read(reader)?;
        let salvos_fired = reader.get_u32()?;

        let count = reader.get_u16()?;
        let mut status_times = BTreeMap::new();
        for _ in 0..count {
            let entry = AssignmentStatus::read(reader)?;
            status_times.insert(entry, reader.get_f64()?);
        }

        let cantco_reason = if reader.get_bool()? { Some(reader.get_string()?) } else { None };
        let systemic_scope = read_optional_tag::<SystemicScope>(reader)?;
        let has_overriding = reader.get_bool()?;
        let overriding = WeaponRef { asset: reader.get_id()?, weapon: reader.get_id()? };
        let updated_shot_doctrine = read_optional_tag::<ShotDoctrine>(reader)?;

        Ok(Self {
            header,
            ack_time,
            reference_track,
            initiating_unit,
            assigning_unit,
            assigned_weapon,
            salvos_fired,
            status,
            status_times,
            cantco_reason,
            systemic_scope,
            overriding_weapon: has_overriding.then_some(overriding),
            updated_shot_doctrine,
        })
    }
}

fn read_optional_tag<T: WireTag>(reader: &mut BufferReader<'_>) -> std::result::Result<Option<T>, WireError> {
    let present = reader.get_bool()?;
    let tag = reader.get_u16()?;
    if !present {
        return Ok(None);
    }
    T::from_tag(tag).map(Some).ok_or(WireError::InvalidTag { field: T::FIELD, tag })
}
