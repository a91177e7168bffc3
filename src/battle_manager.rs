//! # Battle Manager モジュール
//!
//! 戦闘管理（武器割り当て）の1スケジューリングサイクルを実行します。
//!
//! ## 主要機能
//! - ペアリング生成：トラック × 武器の全候補を評価
//! - スコア行列：目標優先度順に順位付けし、各順位内をスコア降順に並べる
//! - 割り当て：順位ごとの貪欲法、またはハンガリアン法による最適化
//! - 割り当てメッセージ・キューの生成（割り当て遅延があれば遅延処理時刻つき）
//! - ACK処理：終端での資源解放、担当変更、射撃ドクトリン変更、システム的CANTCOの除外登録
//! - 割り当て監視：最大射撃時間を過ぎても未射撃の割り当てを取り消し
//!
//! ## 資源の扱い
//! 割り当てを確定した時点で武器の推定資源（火器チャンネル・準備弾数）と
//! アセットの割り当て数を増やし、終端ACKや取り消しで戻します。
//! 同じサイクル内の割り当てでは `CapacityLedger` が残り容量を管理します。

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{IadsError, Result};
use crate::exclusion::ExclusionArray;
use crate::intercept::VclInterceptCalculator;
use crate::messages::{
    AssignmentAckMessage, AssignmentMessage, AssignmentStatus, CombatStatusMessage, CueAckMessage, CueMessage,
    CueStatus, HavcoReportingStyle, ShotDoctrine,
};
use crate::models::{AssetMap, IdRecord, InterceptCalculator, TerrainInterface, TrackRecord, WeaponRef};
use crate::munkres::{AssessmentMatrix, UNASSIGNABLE_COST};
use crate::pairing::{ProjectionSettings, REASON_UNIT_EXCLUDED, ScoreWeights, WeaponPairing};
use crate::scoring_matrix::WeaponScoringMatrix;
use crate::terrain::NullTerrainEngine;
use crate::weapon_table::WeaponTable;

pub const REASON_ASSET_NOT_OPERATIONAL: &str = "Asset is not operational";
pub const REASON_NO_CAPACITY: &str = "Weapon has no available capacity";
pub const REASON_MAX_FIRING_TIME: &str = "Max firing time exceeded";
pub const REASON_TRACK_DROPPED: &str = "Track dropped";

/// 割り当て方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationMode {
    /// 順位ごとに最高スコアの武器を選ぶ
    #[default]
    Greedy,
    /// 全順位の合計スコアを最大化する
    Optimal,
}

/// 戦闘管理の設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BattleManagerConfig {
    /// 戦闘管理ユニットのID（割り当ての送信者）
    pub id: IdRecord,
    pub stale_asset_time_s: f64,
    pub shot_doctrine: ShotDoctrine,
    pub max_firing_time_s: f64,
    pub allocation: AllocationMode,
    pub weights: ScoreWeights,
    pub projection: ProjectionSettings,
    pub havco_reporting: HavcoReportingStyle,
    /// 割り当てメッセージの配送遅延（秒）
    pub assignment_delay_s: f64,
    pub print_valid_units: bool,
    pub print_invalid_unit_details: bool,
}

impl Default for BattleManagerConfig {
    fn default() -> Self {
        Self {
            id: IdRecord::new(1, 0),
            stale_asset_time_s: 60.0,
            shot_doctrine: ShotDoctrine::ShootLookShoot,
            max_firing_time_s: 360.0,
            allocation: AllocationMode::Greedy,
            weights: ScoreWeights::default(),
            projection: ProjectionSettings::default(),
            havco_reporting: HavcoReportingStyle::default(),
            assignment_delay_s: 0.0,
            print_valid_units: false,
            print_invalid_unit_details: false,
        }
    }
}

impl BattleManagerConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.id.is_unset() {
            return Err("battle_manager.id must be set".to_string());
        }
        if !(self.stale_asset_time_s > 0.0) {
            return Err(format!("stale_asset_time_s must be positive (got {})", self.stale_asset_time_s));
        }
        if !(self.max_firing_time_s > 0.0) {
            return Err(format!("max_firing_time_s must be positive (got {})", self.max_firing_time_s));
        }
        if !(self.assignment_delay_s >= 0.0) {
            return Err(format!("assignment_delay_s must be non-negative (got {})", self.assignment_delay_s));
        }
        if let Some(window) = self.projection.max_projection_time_s {
            if !(window >= 0.0) {
                return Err(format!("max_projection_time_s must be non-negative (got {})", window));
            }
        }
        if let Some(increment) = self.projection.projection_increment_s {
            if !(increment >= 0.0) {
                return Err(format!("projection_increment_s must be non-negative (got {})", increment));
            }
        }
        self.weights.validate()
    }
}

/// 割り当て結果（ペアリングの借用を解いた後に確定させる）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AllocationDecision {
    pub track: IdRecord,
    pub weapon: WeaponRef,
    pub rank: usize,
    pub score: f64,
    pub intercept_time_s: f64,
}

/// 進行中・完了した割り当ての記録
#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentRecord {
    pub assignment: AssignmentMessage,
    pub ack: AssignmentAckMessage,
    /// 確保した弾数
    pub shots: u32,
    pub cue: Option<CueMessage>,
    pub cue_status: Option<CueStatus>,
}

impl AssignmentRecord {
    pub fn track(&self) -> IdRecord {
        self.assignment.reference_track
    }

    pub fn weapon(&self) -> WeaponRef {
        self.assignment.assigned_weapon
    }

    pub fn status(&self) -> AssignmentStatus {
        self.ack.status()
    }

    pub fn is_complete(&self) -> bool {
        self.ack.status().is_terminal()
    }
}

/// 1サイクルの結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub sim_time: f64,
    pub tracks_considered: usize,
    pub pairings_evaluated: usize,
    pub valid_pairings: usize,
    pub decisions: Vec<AllocationDecision>,
    /// 新規の割り当て（送出待ち）
    pub assignments: Vec<AssignmentMessage>,
    pub cues: Vec<CueMessage>,
    /// 取り消し指令
    pub cancellations: Vec<AssignmentMessage>,
}

/// サイクル内の残り容量
#[derive(Debug, Clone, Default)]
struct CapacityLedger {
    weapon_slots: BTreeMap<WeaponRef, u32>,
    asset_slots: BTreeMap<IdRecord, u32>,
}

impl CapacityLedger {
    fn from_assets(assets: &AssetMap, shots: u32) -> Self {
        let mut ledger = Self::default();
        for asset in assets.iter() {
            ledger.asset_slots.insert(asset.id, asset.open_assignments());
            for weapon in asset.weapons() {
                ledger.weapon_slots.insert(weapon.weapon_ref(), weapon.assignment_capacity(shots));
            }
        }
        ledger
    }

    fn slots(&self, weapon: WeaponRef) -> u32 {
        let weapon_slots = self.weapon_slots.get(&weapon).copied().unwrap_or(0);
        let asset_slots = self.asset_slots.get(&weapon.asset).copied().unwrap_or(0);
        weapon_slots.min(asset_slots)
    }

    fn can_take(&self, weapon: WeaponRef) -> bool {
        self.slots(weapon) > 0
    }

    fn take(&mut self, weapon: WeaponRef) {
        if let Some(slots) = self.weapon_slots.get_mut(&weapon) {
            *slots = slots.saturating_sub(1);
        }
        if let Some(slots) = self.asset_slots.get_mut(&weapon.asset) {
            *slots = slots.saturating_sub(1);
        }
    }
}

/// 戦闘管理
pub struct BattleManager {
    config: BattleManagerConfig,
    weapon_table: WeaponTable,
    exclusions: ExclusionArray,
    calculator: Box<dyn InterceptCalculator>,
    terrain: Option<Box<dyn TerrainInterface>>,
    assignments: BTreeMap<IdRecord, AssignmentRecord>,
    completed: Vec<AssignmentRecord>,
}

impl BattleManager {
    /// 標準の迎撃計算（VCL）と地形なしエンジンで作成
    pub fn new(config: BattleManagerConfig, weapon_table: WeaponTable) -> Self {
        Self::with_strategies(
            config,
            weapon_table,
            Box::new(VclInterceptCalculator::default()),
            Some(Box::new(NullTerrainEngine)),
        )
    }

    /// 迎撃計算・地形の戦略を指定して作成
    pub fn with_strategies(
        config: BattleManagerConfig,
        weapon_table: WeaponTable,
        calculator: Box<dyn InterceptCalculator>,
        terrain: Option<Box<dyn TerrainInterface>>,
    ) -> Self {
        Self {
            config,
            weapon_table,
            exclusions: ExclusionArray::new(),
            calculator,
            terrain,
            assignments: BTreeMap::new(),
            completed: Vec::new(),
        }
    }

    pub fn config(&self) -> &BattleManagerConfig {
        &self.config
    }

    pub fn exclusions(&self) -> &ExclusionArray {
        &self.exclusions
    }

    pub fn active_assignments(&self) -> impl Iterator<Item = &AssignmentRecord> {
        self.assignments.values()
    }

    pub fn assignment(&self, track: &IdRecord) -> Option<&AssignmentRecord> {
        self.assignments.get(track)
    }

    pub fn completed_assignments(&self) -> &[AssignmentRecord] {
        &self.completed
    }

    fn shots_per_assignment(&self) -> u32 {
        self.config.shot_doctrine.missiles_to_commit()
    }

    /// 1スケジューリングサイクル
    ///
    /// 消失したトラック・最大射撃時間超過の割り当てを取り消した後、
    /// 未割り当てのトラックに対してペアリングと割り当てを行います。
    pub fn run_cycle(&mut self, sim_time: f64, assets: &mut AssetMap, tracks: &[TrackRecord]) -> Result<CycleReport> {
        let mut report = CycleReport { sim_time, ..Default::default() };

        report.cancellations.extend(self.cancel_dropped_tracks(sim_time, assets, tracks));
        report.cancellations.extend(self.monitor_assignments(sim_time, assets));

        {
            let pairings = self.perform_weapon_pairings(sim_time, assets, tracks);
            report.pairings_evaluated = pairings.len();
            report.tracks_considered = pairings.iter().map(|p| p.track_id()).collect::<BTreeSet<_>>().len();

            let valid: Vec<WeaponPairing<'_>> = pairings.into_iter().filter(|p| !p.is_failed()).collect();
            report.valid_pairings = valid.len();

            let matrix = WeaponScoringMatrix::build(valid)?;
            if self.config.print_valid_units {
                for ranked in matrix.ranks() {
                    for pairing in &ranked.pairings {
                        info!(
                            rank = ranked.rank,
                            track = %ranked.track_id,
                            weapon = %pairing.weapon_ref(),
                            score = pairing.score(),
                            bearing_deg = pairing.results().map_or(0.0, |r| r.bearing_rad.to_degrees()),
                            "有効な武器候補"
                        );
                    }
                }
            }
            report.decisions = self.allocate(&matrix, assets)?;
        }

        for decision in report.decisions.clone() {
            let (assignment, cue) = self.commit_decision(sim_time, &decision, assets)?;
            report.assignments.push(assignment);
            report.cues.extend(cue);
        }

        info!(
            time = sim_time,
            tracks = report.tracks_considered,
            pairings = report.pairings_evaluated,
            valid = report.valid_pairings,
            assigned = report.assignments.len(),
            cancelled = report.cancellations.len(),
            "割り当てサイクル完了"
        );
        Ok(report)
    }

    /// 全候補のペアリングを生成・評価
    ///
    /// 交戦対象外（友軍・中立）と既に割り当て中のトラックは対象外です。
    /// 失敗したペアリングも理由つきで返します。
    pub fn perform_weapon_pairings<'a>(
        &'a self,
        sim_time: f64,
        assets: &'a AssetMap,
        tracks: &'a [TrackRecord],
    ) -> Vec<WeaponPairing<'a>> {
        let shots = self.shots_per_assignment();
        let mut pairings = Vec::new();

        for track in tracks {
            if !track.iff.is_engageable() {
                debug!(track = %track.id, iff = ?track.iff, "交戦対象外のトラック");
                continue;
            }
            if self.assignments.contains_key(&track.id) {
                continue;
            }
            let Some(row) = self.weapon_table.get_weapon_table_row(track, false) else {
                debug!(track = %track.id, target_type = %track.target_type, "一致する武器テーブル行なし");
                continue;
            };

            for asset in assets.iter() {
                for weapon in asset.weapons() {
                    let mut pairing = WeaponPairing::new(weapon, asset, track, row);

                    if self.exclusions.is_asset_excluded(&track.id, &asset.id) {
                        pairing.set_external_fail(REASON_UNIT_EXCLUDED, true);
                    } else if !asset.is_operational() {
                        pairing.set_external_fail(REASON_ASSET_NOT_OPERATIONAL, true);
                    } else if weapon.assignment_capacity(shots) == 0 || asset.open_assignments() == 0 {
                        pairing.set_external_fail(REASON_NO_CAPACITY, true);
                    } else if pairing.check_weapon_status_stale(sim_time, self.config.stale_asset_time_s)
                        && pairing.check_weapon_table_exclusion()
                        && pairing.check_can_weapon_intercept(
                            sim_time,
                            self.calculator.as_ref(),
                            self.terrain.as_deref(),
                            &self.config.projection,
                        )
                    {
                        pairing.check_preference_passed();
                    }
                    pairing.compute_weapon_score(&self.config.weights);

                    if self.config.print_invalid_unit_details && pairing.is_failed() {
                        info!(
                            track = %track.id,
                            weapon = %pairing.weapon_ref(),
                            reason = pairing.failed_reason().unwrap_or("No intercept solution"),
                            "無効な武器候補"
                        );
                    }
                    pairings.push(pairing);
                }
            }
        }
        pairings
    }

    /// スコア行列から割り当てを決定
    pub fn allocate(&self, matrix: &WeaponScoringMatrix<'_>, assets: &AssetMap) -> Result<Vec<AllocationDecision>> {
        let ledger = CapacityLedger::from_assets(assets, self.shots_per_assignment());
        match self.config.allocation {
            AllocationMode::Greedy => Ok(allocate_greedy(matrix, ledger)),
            AllocationMode::Optimal => allocate_optimal(matrix, ledger),
        }
    }

    fn commit_decision(
        &mut self,
        sim_time: f64,
        decision: &AllocationDecision,
        assets: &mut AssetMap,
    ) -> Result<(AssignmentMessage, Option<CueMessage>)> {
        let shots = self.shots_per_assignment();
        assets.commit_assignment(decision.weapon, shots)?;

        let mut assignment =
            AssignmentMessage::new(self.config.id, sim_time, decision.track, decision.weapon, self.config.shot_doctrine);
        assignment.max_firing_time_s = self.config.max_firing_time_s;
        let latent_time = (self.config.assignment_delay_s > 0.0).then(|| sim_time + self.config.assignment_delay_s);
        if let Some(time) = latent_time {
            assignment.header_mut().set_latent_process_time(time);
        }

        let cue = assets.get(decision.weapon.asset).and_then(|a| a.cue_sensor).map(|sensor| {
            let mut cue = CueMessage::new(self.config.id, sim_time, decision.track, decision.weapon.asset, sensor);
            if let Some(time) = latent_time {
                cue.header_mut().set_latent_process_time(time);
            }
            cue
        });

        info!(
            track = %decision.track,
            weapon = %decision.weapon,
            rank = decision.rank,
            score = decision.score,
            intercept_time = decision.intercept_time_s,
            "武器を割り当て"
        );

        let ack = AssignmentAckMessage::for_assignment(&assignment, decision.weapon.asset, sim_time);
        self.assignments.insert(
            decision.track,
            AssignmentRecord { assignment: assignment.clone(), ack, shots, cue: cue.clone(), cue_status: None },
        );
        Ok((assignment, cue))
    }

    /// 割り当てACKの処理
    ///
    /// # 戻り値
    ///
    /// 反映後のステータス
    pub fn process_assignment_ack(
        &mut self,
        ack: &AssignmentAckMessage,
        assets: &mut AssetMap,
    ) -> Result<AssignmentStatus> {
        let track = ack.reference_track;
        let record = self.assignments.get_mut(&track).ok_or(IadsError::UnknownAssignment(track))?;
        let mut updated = record.ack.clone();
        updated.apply_update(ack)?;

        let status = ack.status();
        if status == AssignmentStatus::ChangedAssignedUnit {
            if let Some(new_weapon) = ack.overriding_weapon() {
                let old_weapon = record.assignment.assigned_weapon;
                // 付け替えに失敗した場合はACKも反映しない
                assets.reassign(old_weapon, new_weapon, record.shots)?;
                record.assignment.assigned_weapon = new_weapon;
                updated.assigned_weapon = new_weapon;
                info!(track = %track, from = %old_weapon, to = %new_weapon, "割り当て先ユニットを変更");
            }
        }
        record.ack = updated;

        match status {
            AssignmentStatus::ChangedAssignedUnit => {}
            AssignmentStatus::UpdatedShotDoctrine => {
                if let Some(doctrine) = ack.updated_shot_doctrine() {
                    let delta = ShotDoctrine::munitions_difference(record.assignment.shot_doctrine, doctrine);
                    let weapon = record.assignment.assigned_weapon;
                    let target = assets.weapon_mut(weapon).ok_or(IadsError::UnknownWeapon {
                        asset: weapon.asset,
                        weapon: weapon.weapon,
                    })?;
                    target.adjust_munitions(delta);
                    record.shots = doctrine.missiles_to_commit();
                    record.assignment.shot_doctrine = doctrine;
                    info!(track = %track, doctrine = %doctrine, delta, "射撃ドクトリンを更新");
                }
            }
            s if s.is_terminal() => {
                if s == AssignmentStatus::Cantco {
                    warn!(
                        track = %track,
                        weapon = %record.assignment.assigned_weapon,
                        reason = ack.cantco_reason().unwrap_or(""),
                        "CANTCOを受信"
                    );
                    self.exclusions.add_exclusion(ack);
                }
                self.complete_assignment(&track, assets);
            }
            _ => debug!(track = %track, status = %status, "割り当てステータス更新"),
        }
        Ok(status)
    }

    /// キューACKの処理
    pub fn process_cue_ack(&mut self, ack: &CueAckMessage) -> Result<()> {
        let record = self
            .assignments
            .get_mut(&ack.reference_track)
            .ok_or(IadsError::UnknownAssignment(ack.reference_track))?;
        if ack.status == CueStatus::Cantco {
            warn!(track = %ack.reference_track, sensor = %ack.cued_sensor, "キューに対するCANTCO");
        } else {
            debug!(track = %ack.reference_track, status = %ack.status, "キューステータス更新");
        }
        record.cue_status = Some(ack.status);
        Ok(())
    }

    /// 戦闘ステータスを認識上のアセットへ反映
    pub fn apply_combat_status(&self, status: &CombatStatusMessage, assets: &mut AssetMap) -> Result<()> {
        let asset = assets.get_mut(status.asset).ok_or(IadsError::UnknownAsset(status.asset))?;
        status.apply_to(asset);
        Ok(())
    }

    /// 最大射撃時間を超えて未射撃の割り当てを取り消す
    pub fn monitor_assignments(&mut self, sim_time: f64, assets: &mut AssetMap) -> Vec<AssignmentMessage> {
        let expired: Vec<IdRecord> = self
            .assignments
            .values()
            .filter(|r| {
                r.ack.salvos_fired == 0 && sim_time - r.assignment.assignment_time > self.config.max_firing_time_s
            })
            .map(|r| r.track())
            .collect();

        expired
            .into_iter()
            .filter_map(|track| self.cancel_assignment(&track, sim_time, REASON_MAX_FIRING_TIME, assets))
            .collect()
    }

    /// トラック一覧から消えた割り当てを取り消す
    fn cancel_dropped_tracks(
        &mut self,
        sim_time: f64,
        assets: &mut AssetMap,
        tracks: &[TrackRecord],
    ) -> Vec<AssignmentMessage> {
        let live: BTreeSet<IdRecord> = tracks.iter().map(|t| t.id).collect();
        let dropped: Vec<IdRecord> = self.assignments.keys().filter(|id| !live.contains(id)).copied().collect();

        dropped
            .into_iter()
            .filter_map(|track| {
                self.exclusions.remove_track(&track);
                self.cancel_assignment(&track, sim_time, REASON_TRACK_DROPPED, assets)
            })
            .collect()
    }

    /// 割り当てを取り消して取り消し指令を返す
    pub fn cancel_assignment(
        &mut self,
        track: &IdRecord,
        sim_time: f64,
        reason: &str,
        assets: &mut AssetMap,
    ) -> Option<AssignmentMessage> {
        let record = self.assignments.get_mut(track)?;
        if let Err(e) = record.ack.set_status(AssignmentStatus::Cancelled, sim_time) {
            warn!(track = %track, error = %e, "割り当てを取り消せません");
            return None;
        }
        let cancel = record.assignment.to_cancel(self.config.id, sim_time);
        info!(track = %track, weapon = %cancel.assigned_weapon, reason, "割り当てを取り消し");
        self.complete_assignment(track, assets);
        Some(cancel)
    }

    fn complete_assignment(&mut self, track: &IdRecord, assets: &mut AssetMap) {
        let Some(record) = self.assignments.remove(track) else {
            return;
        };
        if let Err(e) = assets.release_assignment(record.weapon(), record.shots) {
            warn!(track = %track, error = %e, "推定資源を解放できません");
        }
        debug!(track = %track, status = %record.status(), "割り当て完了");
        self.completed.push(record);
    }
}

/// 順位ごとに、容量の残る最高スコアの武器を選ぶ
fn allocate_greedy(matrix: &WeaponScoringMatrix<'_>, mut ledger: CapacityLedger) -> Vec<AllocationDecision> {
    let mut decisions = Vec::new();
    for ranked in matrix.ranks() {
        if let Some(pairing) = ranked.pairings.iter().find(|p| ledger.can_take(p.weapon_ref())) {
            ledger.take(pairing.weapon_ref());
            decisions.push(decision_from(ranked.rank, pairing));
        }
    }
    decisions
}

/// 合計スコア最大の割り当て
///
/// 行 = 順位、列 = 武器の割り当て枠（容量の数だけ列を複製）、コスト = -スコア。
/// アセット単位の割り当て上限は解いた後に順位順で適用します。
fn allocate_optimal(matrix: &WeaponScoringMatrix<'_>, mut ledger: CapacityLedger) -> Result<Vec<AllocationDecision>> {
    let weapons: BTreeSet<WeaponRef> =
        matrix.ranks().iter().flat_map(|r| r.pairings.iter().map(|p| p.weapon_ref())).collect();

    let mut columns = Vec::new();
    for weapon in weapons {
        let slots = (ledger.slots(weapon) as usize).min(matrix.len());
        columns.extend(std::iter::repeat_n(weapon, slots));
    }
    if columns.is_empty() {
        return Ok(Vec::new());
    }

    let mut costs = AssessmentMatrix::new(matrix.len(), columns.len());
    for (row, ranked) in matrix.ranks().iter().enumerate() {
        for (col, weapon) in columns.iter().enumerate() {
            if let Some(pairing) = ranked.pairings.iter().find(|p| p.weapon_ref() == *weapon) {
                costs.set_cost(row, col, -pairing.score())?;
            }
        }
    }
    costs.optimize();

    let mut decisions = Vec::new();
    for (row, ranked) in matrix.ranks().iter().enumerate() {
        let Some(col) = costs.assigned_column(row)? else {
            continue;
        };
        if costs.cost(row, col).is_none_or(|c| c >= UNASSIGNABLE_COST) {
            continue;
        }
        let weapon = columns[col];
        if !ledger.can_take(weapon) {
            debug!(track = %ranked.track_id, weapon = %weapon, "アセットの割り当て上限により除外");
            continue;
        }
        if let Some(pairing) = ranked.pairings.iter().find(|p| p.weapon_ref() == weapon) {
            ledger.take(weapon);
            decisions.push(decision_from(ranked.rank, pairing));
        }
    }
    Ok(decisions)
}

fn decision_from(rank: usize, pairing: &WeaponPairing<'_>) -> AllocationDecision {
    AllocationDecision {
        track: pairing.track_id(),
        weapon: pairing.weapon_ref(),
        rank,
        score: pairing.score(),
        intercept_time_s: pairing.results().map_or(f64::MAX, |r| r.time_s),
    }
}
