//! # Simulation モジュール
//!
//! 戦闘管理（BM）を時間駆動で動かすホスト側のシミュレーションエンジンです。
//!
//! BMが持つのは認識上のアセット状態だけで、下位ユニットの実際の資源状態は
//! エンジンが別に保持します。両者は定期的な戦闘ステータス報告で同期します。
//! メッセージはすべてワイヤ形式へ符号化・復号してから受け渡します。
//!
//! ## 1ステップの処理順序
//!
//! 1. **トラック出現**: 出現時刻に達した目標をトラックDBへ登録
//! 2. **戦闘ステータス報告**: 報告周期ごとに各アセットの実状態をBMへ送信
//! 3. **遅延メッセージ配送**: 処理時刻に達した割り当て・キューをユニットへ配送
//! 4. **応答スクリプト**: 予定時刻に達したユニットの応答をBMへ送信
//! 5. **BMサイクル**: サイクル周期ごとにペアリングと割り当てを実行
//! 6. **トラック更新**: 等速直線運動で目標を外挿
//!
//! ## 使用例
//!
//! ```no_run
//! use iadsc2::scenario::ScenarioConfig;
//! use iadsc2::simulation::SimulationEngine;
//!
//! let config = ScenarioConfig::from_file("scenarios/two_batteries.yaml")?;
//! let mut engine = SimulationEngine::new(config, 1);
//! engine.run()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::battle_manager::{BattleManager, CycleReport, REASON_NO_CAPACITY};
use crate::error::IadsError;
use crate::messages::wire::WireError;
use crate::messages::{
    AssignmentAckMessage, AssignmentMessage, AssignmentReason, AssignmentStatus, CombatStatusMessage, CueAckMessage,
    CueMessage, CueStatus, IadsMessage, WireMessage,
};
use crate::models::common::numeric;
use crate::models::{AssetMap, IdRecord, TrackDb, TrackRecord, WeaponRef};
use crate::scenario::{ResponseConfig, ScenarioConfig};

/// シミュレーション実行エラー
#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("戦闘管理エラー: {0}")]
    Iads(#[from] IadsError),

    #[error("メッセージ符号化エラー: {0}")]
    Wire(#[from] WireError),
}

/// ユニット側で保持する割り当て
#[derive(Debug, Clone)]
struct UnitAssignment {
    ack: AssignmentAckMessage,
    weapon: WeaponRef,
    shots: u32,
}

/// 実行統計
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationStats {
    pub cycles: u64,
    pub assignments: u64,
    pub cues: u64,
    pub cancellations: u64,
    pub acks_processed: u64,
    pub kills: u64,
    pub cantcos: u64,
    pub tracks_dropped: u64,
}

pub struct SimulationEngine {
    pub current_time: f64,
    pub dt: f64,
    pub max_time: f64,
    pub step_count: u64,

    pub scenario_config: ScenarioConfig,
    pub verbose_level: u8,

    battle_manager: BattleManager,
    /// BMの認識上のアセット
    perceived_assets: AssetMap,
    /// 下位ユニットの実状態
    unit_assets: AssetMap,
    tracks: TrackDb,
    pending_tracks: Vec<(f64, TrackRecord)>,
    /// センサー更新が途絶える時刻
    lost_times: BTreeMap<IdRecord, f64>,
    pending_responses: Vec<ResponseConfig>,
    /// 配送待ちのメッセージ（符号化済み）
    in_flight: Vec<Vec<u8>>,
    unit_assignments: BTreeMap<IdRecord, UnitAssignment>,
    next_cycle_time: f64,
    next_status_time: f64,
    stats: SimulationStats,
}

impl SimulationEngine {
    pub fn new(scenario: ScenarioConfig, verbose_level: u8) -> Self {
        let battle_manager = BattleManager::new(scenario.battle_manager.clone(), scenario.weapon_table());
        let assets = scenario.build_assets();

        let mut pending_tracks = scenario.build_tracks();
        pending_tracks.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let lost_times = scenario
            .tracks
            .iter()
            .filter_map(|t| t.lost_time_s.map(|lost| (t.id, lost)))
            .collect();
        let mut pending_responses = scenario.responses.clone();
        pending_responses.sort_by(|a, b| a.time_s.partial_cmp(&b.time_s).unwrap_or(std::cmp::Ordering::Equal));

        Self {
            current_time: 0.0,
            dt: scenario.sim.dt_s,
            max_time: scenario.sim.t_max_s,
            step_count: 0,
            battle_manager,
            perceived_assets: assets.clone(),
            unit_assets: assets,
            tracks: TrackDb::new(),
            pending_tracks,
            lost_times,
            pending_responses,
            in_flight: Vec::new(),
            unit_assignments: BTreeMap::new(),
            next_cycle_time: 0.0,
            next_status_time: 0.0,
            stats: SimulationStats::default(),
            scenario_config: scenario,
            verbose_level,
        }
    }

    pub fn battle_manager(&self) -> &BattleManager {
        &self.battle_manager
    }

    pub fn perceived_assets(&self) -> &AssetMap {
        &self.perceived_assets
    }

    pub fn unit_assets(&self) -> &AssetMap {
        &self.unit_assets
    }

    pub fn tracks(&self) -> &TrackDb {
        &self.tracks
    }

    pub fn stats(&self) -> &SimulationStats {
        &self.stats
    }

    pub fn run(&mut self) -> Result<(), SimulationError> {
        info!(
            scenario = %self.scenario_config.meta.name,
            assets = self.unit_assets.len(),
            tracks = self.pending_tracks.len(),
            "=== シミュレーション実行開始 ==="
        );

        while numeric::less_equal(self.current_time, self.max_time, numeric::DEFAULT_TOLERANCE) {
            self.step()?;

            if self.verbose_level > 2 {
                trace!("時刻: {:.1}秒 (ステップ: {})", self.current_time, self.step_count);
            }

            if self.step_count % 100 == 0 && self.verbose_level > 0 {
                let progress = (self.current_time / self.max_time) * 100.0;
                info!("進行状況: {:.1}% ({:.1}/{:.1}秒)", progress, self.current_time, self.max_time);
            }
        }

        info!("=== シミュレーション完了 ===");
        info!("実行時間: {:.1}秒", self.current_time);
        info!("総ステップ数: {}", self.step_count);
        Ok(())
    }

    /// 1時間刻み分の処理
    pub fn step(&mut self) -> Result<(), SimulationError> {
        let now = self.current_time;

        self.activate_tracks(now);
        self.drop_lost_tracks(now);

        if numeric::greater_equal(now, self.next_status_time, numeric::DEFAULT_TOLERANCE) {
            self.report_combat_status(now)?;
            self.next_status_time += self.scenario_config.sim.status_period_s;
        }

        self.deliver_messages(now)?;
        self.run_responses(now)?;

        if numeric::greater_equal(now, self.next_cycle_time, numeric::DEFAULT_TOLERANCE) {
            let tracks = self.tracks.snapshot();
            let report = self.battle_manager.run_cycle(now, &mut self.perceived_assets, &tracks)?;
            self.dispatch_cycle(report)?;
            self.next_cycle_time += self.scenario_config.sim.cycle_period_s;
        }

        for track in self.tracks.iter_mut() {
            let lost = self
                .lost_times
                .get(&track.id)
                .is_some_and(|lost| numeric::greater_equal(now, *lost, numeric::DEFAULT_TOLERANCE));
            if !lost {
                track.propagate(self.dt);
            }
        }

        self.step_count += 1;
        self.current_time = self.step_count as f64 * self.dt;
        Ok(())
    }

    fn activate_tracks(&mut self, now: f64) {
        let due = self
            .pending_tracks
            .iter()
            .take_while(|(appear, _)| numeric::less_equal(*appear, now, numeric::DEFAULT_TOLERANCE))
            .count();
        for (_, mut track) in self.pending_tracks.drain(..due) {
            track.time = now;
            if self.verbose_level > 0 {
                info!(track = %track.id, target_type = %track.target_type, "目標出現");
            }
            self.tracks.upsert(track);
        }
    }

    /// 更新が途絶えて一定時間経ったトラックを削除
    fn drop_lost_tracks(&mut self, now: f64) {
        for id in self.tracks.drop_stale(now, self.scenario_config.sim.track_timeout_s) {
            self.stats.tracks_dropped += 1;
            info!(track = %id, "トラック喪失");
        }
    }

    /// 各アセットの実状態を戦闘ステータスとしてBMへ報告
    fn report_combat_status(&mut self, now: f64) -> Result<(), SimulationError> {
        let reports: Vec<CombatStatusMessage> = self
            .unit_assets
            .iter()
            .map(|asset| CombatStatusMessage::from_asset(asset, now))
            .collect();

        for report in reports {
            let bytes = report.encode()?;
            let received = CombatStatusMessage::decode(&bytes)?;
            self.battle_manager.apply_combat_status(&received, &mut self.perceived_assets)?;
        }
        debug!(time = now, assets = self.unit_assets.len(), "戦闘ステータスを送信");
        Ok(())
    }

    fn dispatch_cycle(&mut self, report: CycleReport) -> Result<(), SimulationError> {
        self.stats.cycles += 1;
        self.stats.assignments += report.assignments.len() as u64;
        self.stats.cues += report.cues.len() as u64;
        self.stats.cancellations += report.cancellations.len() as u64;

        // 取り消しは同じサイクルの再割り当てより先に届ける
        let messages = report
            .cancellations
            .into_iter()
            .chain(report.assignments)
            .map(IadsMessage::Assignment)
            .chain(report.cues.into_iter().map(IadsMessage::Cue));
        for message in messages {
            self.in_flight.push(message.encode()?);
        }
        Ok(())
    }

    /// 処理時刻に達したメッセージをユニットへ配送
    fn deliver_messages(&mut self, now: f64) -> Result<(), SimulationError> {
        let mut waiting = Vec::new();
        let mut ready = Vec::new();
        for bytes in std::mem::take(&mut self.in_flight) {
            let message = IadsMessage::decode(&bytes)?;
            if message.is_time_to_process(now) {
                ready.push(message);
            } else {
                waiting.push(bytes);
            }
        }
        self.in_flight = waiting;

        for message in ready {
            match message {
                IadsMessage::Assignment(assignment) => self.receive_assignment(&assignment, now)?,
                IadsMessage::Cue(cue) => self.receive_cue(&cue, now)?,
                other => warn!(message_type = ?other.header().message_type, "ユニット宛てでないメッセージを破棄"),
            }
        }
        Ok(())
    }

    fn receive_assignment(&mut self, assignment: &AssignmentMessage, now: f64) -> Result<(), SimulationError> {
        let track = assignment.reference_track;

        if assignment.reason == AssignmentReason::Cancel {
            if let Some(mut unit) = self.unit_assignments.remove(&track) {
                if unit.ack.set_status(AssignmentStatus::Cancelled, now).is_ok() {
                    self.unit_assets.release_assignment(unit.weapon, unit.shots)?;
                }
                info!(track = %track, weapon = %unit.weapon, "ユニットが割り当て取り消しを受信");
            }
            return Ok(());
        }

        if let Some(previous) = self.unit_assignments.remove(&track) {
            self.unit_assets.release_assignment(previous.weapon, previous.shots)?;
        }

        let weapon = assignment.assigned_weapon;
        let shots = assignment.shot_doctrine.missiles_to_commit();
        let mut ack = AssignmentAckMessage::for_assignment(assignment, assignment.assigned_unit(), now);
        if let Err(e) = self.unit_assets.commit_assignment(weapon, shots) {
            warn!(track = %track, weapon = %weapon, error = %e, "ユニットが割り当てを受けられません");
            self.stats.cantcos += 1;
            ack.set_cantco(REASON_NO_CAPACITY, None, now)?;
            return self.send_ack(&ack);
        }

        if self.scenario_config.sim.auto_wilco {
            ack.set_status(AssignmentStatus::Wilco, now)?;
            self.send_ack(&ack)?;
        }
        debug!(track = %track, weapon = %weapon, "ユニットが割り当てを受信");
        self.unit_assignments.insert(track, UnitAssignment { ack, weapon, shots });
        Ok(())
    }

    fn receive_cue(&mut self, cue: &CueMessage, now: f64) -> Result<(), SimulationError> {
        let status = if self.tracks.get(&cue.reference_track).is_some() {
            CueStatus::Tracking
        } else {
            CueStatus::Searching
        };
        let ack = CueAckMessage::for_cue(cue, status, now);
        let received = CueAckMessage::decode(&ack.encode()?)?;
        if let Err(e) = self.battle_manager.process_cue_ack(&received) {
            warn!(track = %cue.reference_track, error = %e, "キューACKを処理できません");
        }
        Ok(())
    }

    /// 予定時刻に達した応答スクリプトを実行
    fn run_responses(&mut self, now: f64) -> Result<(), SimulationError> {
        let due = self
            .pending_responses
            .iter()
            .take_while(|r| numeric::less_equal(r.time_s, now, numeric::DEFAULT_TOLERANCE))
            .count();
        let responses: Vec<ResponseConfig> = self.pending_responses.drain(..due).collect();
        for response in responses {
            self.apply_response(&response, now)?;
        }
        Ok(())
    }

    fn apply_response(&mut self, response: &ResponseConfig, now: f64) -> Result<(), SimulationError> {
        let style = self.battle_manager.config().havco_reporting;
        let Some(unit) = self.unit_assignments.get_mut(&response.track) else {
            warn!(track = %response.track, status = %response.status, "割り当てのないトラックへの応答を無視");
            return Ok(());
        };

        let result = match response.status {
            AssignmentStatus::Cantco => {
                self.stats.cantcos += 1;
                unit.ack.set_cantco(response.reason.clone().unwrap_or_default(), response.scope, now)
            }
            AssignmentStatus::ChangedAssignedUnit => match response.weapon {
                Some(weapon) => {
                    let mut updated = unit.ack.clone();
                    updated
                        .set_changed_assigned_unit(weapon, now)
                        .and_then(|_| self.unit_assets.reassign(unit.weapon, weapon, unit.shots))
                        .map(|_| {
                            updated.assigned_weapon = weapon;
                            unit.weapon = weapon;
                            unit.ack = updated;
                        })
                }
                None => Ok(()),
            },
            AssignmentStatus::UpdatedShotDoctrine => match response.doctrine {
                Some(doctrine) => unit.ack.set_updated_shot_doctrine(doctrine, now),
                None => Ok(()),
            },
            event @ (AssignmentStatus::Firing | AssignmentStatus::Miss | AssignmentStatus::Kill) => {
                unit.ack.report_engagement(event, style, now).map(|_| ())
            }
            status => unit.ack.set_status(status, now),
        };
        if let Err(e) = result {
            warn!(track = %response.track, error = %e, "応答を適用できません");
            return Ok(());
        }

        let ack = unit.ack.clone();
        self.update_unit_resources(&response.track, &ack)?;
        self.send_ack(&ack)?;

        if response.status == AssignmentStatus::Kill && self.tracks.remove(&response.track).is_some() {
            self.stats.kills += 1;
            info!(track = %response.track, "目標撃破");
        }
        Ok(())
    }

    /// 応答に合わせてユニットの実資源を更新
    fn update_unit_resources(&mut self, track: &IdRecord, ack: &AssignmentAckMessage) -> Result<(), SimulationError> {
        let status = ack.status();
        if status.is_terminal() {
            if let Some(unit) = self.unit_assignments.remove(track) {
                self.unit_assets.release_assignment(unit.weapon, unit.shots)?;
            }
            return Ok(());
        }

        let Some(unit) = self.unit_assignments.get_mut(track) else {
            return Ok(());
        };
        if let Some(doctrine) = ack.updated_shot_doctrine() {
            let shots = doctrine.missiles_to_commit();
            let delta = shots as i32 - unit.shots as i32;
            if let Some(weapon) = self.unit_assets.weapon_mut(unit.weapon) {
                weapon.adjust_munitions(delta);
            }
            unit.shots = shots;
        }
        Ok(())
    }

    /// ACKをワイヤ形式経由でBMへ送信
    fn send_ack(&mut self, ack: &AssignmentAckMessage) -> Result<(), SimulationError> {
        let received = AssignmentAckMessage::decode(&ack.encode()?)?;
        match self.battle_manager.process_assignment_ack(&received, &mut self.perceived_assets) {
            Ok(status) => {
                self.stats.acks_processed += 1;
                debug!(track = %received.reference_track, status = %status, "ACKを処理");
            }
            Err(e) => warn!(track = %received.reference_track, error = %e, "ACKを処理できません"),
        }
        Ok(())
    }

    /// 実行結果の表示
    pub fn print_summary(&self) {
        println!("=== 実行結果 ===");
        println!("シミュレーション時間: {:.1}秒 ({}ステップ)", self.current_time, self.step_count);
        println!("BMサイクル: {}回", self.stats.cycles);
        println!("割り当て: {}件 / キュー: {}件", self.stats.assignments, self.stats.cues);
        println!("取り消し: {}件 / CANTCO: {}件", self.stats.cancellations, self.stats.cantcos);
        println!("処理したACK: {}件", self.stats.acks_processed);
        println!("撃破: {}機 / 残存トラック: {}件", self.stats.kills, self.tracks.len());
        println!("喪失トラック: {}件", self.stats.tracks_dropped);
        println!();

        println!("完了した割り当て:");
        for record in self.battle_manager.completed_assignments() {
            println!(
                "  トラック {} → 武器 {} : {}（発射 {}回）",
                record.track(),
                record.weapon(),
                record.status(),
                record.ack.salvos_fired
            );
        }
        println!("進行中の割り当て:");
        for record in self.battle_manager.active_assignments() {
            println!("  トラック {} → 武器 {} : {}", record.track(), record.weapon(), record.status());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCENARIO: &str = r#"
meta:
  version: "1.0"
  name: "test"
sim:
  dt_s: 1.0
  t_max_s: 20
  cycle_period_s: 2.0
  status_period_s: 4.0
battle_manager:
  id: { id: 1 }
  shot_doctrine: Shoot-2
  assignment_delay_s: 1.0
weapon_table:
  - target_type: BOMBER
    accept_any_subtype: true
    sam:
      - type: SA-10
        priority: 1
assets:
  - id: { id: 20 }
    name: BTRY-1
    lat_deg: 35.0
    lon_deg: 139.0
    cue_sensor: { id: 20, sub_id: 50 }
    weapons:
      - id: { id: 20, sub_id: 1 }
        category: SAM
        type: SA-10
        munitions: 8
        fire_channels: 4
        max_range_m: 200000
        intercept_speed_mps: 1500
tracks:
  - id: { id: 900, sub_id: 1 }
    lat_deg: 35.3
    lon_deg: 139.0
    alt_m: 8000
    velocity_ned_mps: [-150, 0, 0]
    iff: hostile
    type: BOMBER
    priority: 1
responses:
  - time_s: 6
    track: { id: 900, sub_id: 1 }
    status: Firing
  - time_s: 9
    track: { id: 900, sub_id: 1 }
    status: Kill
"#;

    fn engine(yaml: &str) -> SimulationEngine {
        SimulationEngine::new(ScenarioConfig::from_yaml_str(yaml).unwrap(), 0)
    }

    #[test]
    fn test_assignment_delivered_after_latency() {
        let mut engine = engine(SCENARIO);
        // t=0: 割り当て（処理時刻 t=1）
        engine.step().unwrap();
        assert_eq!(engine.stats().assignments, 1);
        assert_eq!(engine.stats().cues, 1);
        let record = engine.battle_manager().assignment(&IdRecord::new(900, 1)).unwrap();
        assert_eq!(record.status(), AssignmentStatus::Unacknowledged);

        // t=1: 配送されてWILCOが返る
        engine.step().unwrap();
        let record = engine.battle_manager().assignment(&IdRecord::new(900, 1)).unwrap();
        assert_eq!(record.status(), AssignmentStatus::Wilco);
        assert_eq!(record.cue_status, Some(CueStatus::Tracking));

        let unit_weapon = engine.unit_assets().weapon(record.weapon()).unwrap();
        assert_eq!(unit_weapon.estimated_munitions_prepped(), 6);
        assert_eq!(unit_weapon.estimated_allocated_fire_channels(), 1);
    }

    #[test]
    fn test_scripted_kill_completes_engagement() {
        let mut engine = engine(SCENARIO);
        engine.run().unwrap();

        let stats = engine.stats();
        assert_eq!(stats.kills, 1);
        assert_eq!(stats.assignments, 1);
        assert!(engine.tracks().is_empty());
        assert_eq!(engine.battle_manager().active_assignments().count(), 0);

        let completed = engine.battle_manager().completed_assignments();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status(), AssignmentStatus::HavcoSuccess);
        assert_eq!(completed[0].ack.salvos_fired, 1);

        // 資源は実状態・認識とも解放済み
        let weapon = WeaponRef { asset: IdRecord::new(20, 0), weapon: IdRecord::new(20, 1) };
        assert_eq!(engine.unit_assets().weapon(weapon).unwrap().estimated_allocated_fire_channels(), 0);
        assert_eq!(engine.perceived_assets().weapon(weapon).unwrap().estimated_allocated_fire_channels(), 0);
    }

    #[test]
    fn test_systemic_cantco_blocks_reassignment() {
        let yaml = SCENARIO
            .replace("status: Firing", "status: CANTCO\n    reason: radar fault\n    scope: global")
            .replace("  - time_s: 9\n    track: { id: 900, sub_id: 1 }\n    status: Kill\n", "");
        let mut engine = engine(&yaml);
        engine.run().unwrap();

        assert_eq!(engine.stats().cantcos, 1);
        assert_eq!(engine.stats().assignments, 1);
        assert!(engine.battle_manager().exclusions().is_globally_excluded(&IdRecord::new(20, 0)));
        assert_eq!(engine.tracks().len(), 1);
    }

    #[test]
    fn test_unit_without_capacity_answers_cantco() {
        let mut engine = engine(SCENARIO);
        engine.step().unwrap();

        // 割り当て到着前にユニットの火器チャンネルをすべて埋める
        let weapon = WeaponRef { asset: IdRecord::new(20, 0), weapon: IdRecord::new(20, 1) };
        for _ in 0..4 {
            engine.unit_assets.commit_assignment(weapon, 2).unwrap();
        }
        engine.step().unwrap();

        assert_eq!(engine.stats().cantcos, 1);
        assert!(engine.battle_manager().assignment(&IdRecord::new(900, 1)).is_none());
        let completed = engine.battle_manager().completed_assignments();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status(), AssignmentStatus::Cantco);
        assert_eq!(completed[0].ack.cantco_reason(), Some(REASON_NO_CAPACITY));

        assert_eq!(engine.unit_assets().weapon(weapon).unwrap().estimated_allocated_fire_channels(), 4);
        assert_eq!(engine.perceived_assets().weapon(weapon).unwrap().estimated_allocated_fire_channels(), 0);
    }

    #[test]
    fn test_changed_unit_without_capacity_keeps_assignment() {
        let spare = "        intercept_speed_mps: 1500\n      - id: { id: 20, sub_id: 2 }\n        category: SAM\n        type: SA-10\n        munitions: 0\n        fire_channels: 0\n        intercept_speed_mps: 1500\n";
        let yaml = SCENARIO
            .replacen("        intercept_speed_mps: 1500\n", spare, 1)
            .replace(
                "status: Firing",
                "status: Changed Assigned Unit\n    weapon: { asset: { id: 20 }, weapon: { id: 20, sub_id: 2 } }",
            );
        let mut engine = engine(&yaml);
        for _ in 0..7 {
            engine.step().unwrap();
        }

        let weapon = WeaponRef { asset: IdRecord::new(20, 0), weapon: IdRecord::new(20, 1) };
        let record = engine.battle_manager().assignment(&IdRecord::new(900, 1)).unwrap();
        assert_eq!(record.weapon(), weapon);
        assert_eq!(record.status(), AssignmentStatus::Wilco);
        assert_eq!(engine.unit_assets().weapon(weapon).unwrap().estimated_allocated_fire_channels(), 1);
        assert_eq!(engine.perceived_assets().weapon(weapon).unwrap().estimated_allocated_fire_channels(), 1);
    }

    #[test]
    fn test_lost_track_is_dropped_and_cancelled() {
        let yaml = SCENARIO
            .replace("  status_period_s: 4.0\n", "  status_period_s: 4.0\n  track_timeout_s: 2.0\n")
            .replace("    type: BOMBER\n    priority: 1\n", "    type: BOMBER\n    priority: 1\n    lost_time_s: 3\n");
        let yaml = match yaml.find("responses:") {
            Some(at) => yaml[..at].to_string(),
            None => yaml,
        };
        let mut engine = engine(&yaml);
        engine.run().unwrap();

        let stats = engine.stats();
        assert_eq!(stats.tracks_dropped, 1);
        assert_eq!(stats.assignments, 1);
        assert_eq!(stats.cancellations, 1);
        assert!(engine.tracks().is_empty());

        let completed = engine.battle_manager().completed_assignments();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].status(), AssignmentStatus::Cancelled);

        let weapon = WeaponRef { asset: IdRecord::new(20, 0), weapon: IdRecord::new(20, 1) };
        assert_eq!(engine.unit_assets().weapon(weapon).unwrap().estimated_allocated_fire_channels(), 0);
    }

    #[test]
    fn test_response_without_assignment_is_ignored() {
        let yaml = SCENARIO.replace("time_s: 6", "time_s: 0");
        let mut engine = engine(&yaml);
        engine.step().unwrap();
        assert_eq!(engine.stats().acks_processed, 0);
        assert_eq!(engine.pending_responses.len(), 1);
    }
}
