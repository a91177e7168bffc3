use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::common::{IdRecord, PositionRecord, Vector3};

/// 敵味方識別（IFF）区分
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IffType {
    #[default]
    Unknown,
    Friendly,
    Neutral,
    Hostile,
}

impl IffType {
    /// 交戦対象になり得るか（友軍・中立は対象外）
    pub fn is_engageable(&self) -> bool {
        matches!(self, IffType::Unknown | IffType::Hostile)
    }
}

/// トラックレコード
///
/// トラックDBが所有するスナップショットです。ペアリング処理は1サイクルの間、
/// 読み取り専用の参照として保持します。
#[derive(Debug, Clone, PartialEq)]
pub struct TrackRecord {
    /// (ユニットID, トラック番号)
    pub id: IdRecord,
    pub position: PositionRecord,
    /// ECEF速度（m/s）
    pub velocity: Vector3,
    /// 3x3 位置共分散（行優先）
    pub covariance: Option<[f64; 9]>,
    pub iff: IffType,
    /// 収集時刻（秒）
    pub time: f64,
    pub target_type: String,
    pub target_subtype: String,
    /// 目標優先度（小さいほど優先）
    pub priority: f64,
}

impl TrackRecord {
    pub fn new(id: IdRecord, position: PositionRecord, velocity: Vector3, time: f64) -> Self {
        Self {
            id,
            position,
            velocity,
            covariance: None,
            iff: IffType::Unknown,
            time,
            target_type: String::new(),
            target_subtype: String::new(),
            priority: 0.0,
        }
    }

    pub fn speed(&self) -> f64 {
        self.velocity.magnitude()
    }

    pub fn altitude(&self) -> f64 {
        self.position.alt_m()
    }

    /// 収集時刻からの経過時間（負にはならない）
    pub fn time_since_collection(&self, sim_time: f64) -> f64 {
        (sim_time - self.time).max(0.0)
    }

    /// 等速直線運動で `dt` 秒先へ外挿したコピー
    pub fn extrapolated(&self, dt: f64) -> TrackRecord {
        let mut projected = self.clone();
        projected.position = self.position.extrapolate(&self.velocity, dt);
        projected.time = self.time + dt;
        projected
    }

    /// 位置を `dt` 秒分進める（シミュレーション上の真値更新）
    pub fn propagate(&mut self, dt: f64) {
        self.position = self.position.extrapolate(&self.velocity, dt);
        self.time += dt;
    }
}

/// トラックDB
///
/// トラックIDをキーに保持し、反復順はID昇順で決定的です。
#[derive(Debug, Clone, Default)]
pub struct TrackDb {
    tracks: BTreeMap<IdRecord, TrackRecord>,
}

impl TrackDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加または更新。既存のトラックがあれば置き換えて返す
    pub fn upsert(&mut self, track: TrackRecord) -> Option<TrackRecord> {
        self.tracks.insert(track.id, track)
    }

    pub fn remove(&mut self, id: &IdRecord) -> Option<TrackRecord> {
        self.tracks.remove(id)
    }

    pub fn get(&self, id: &IdRecord) -> Option<&TrackRecord> {
        self.tracks.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrackRecord> {
        self.tracks.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut TrackRecord> {
        self.tracks.values_mut()
    }

    /// ID昇順のスナップショット
    pub fn snapshot(&self) -> Vec<TrackRecord> {
        self.tracks.values().cloned().collect()
    }

    /// 収集時刻が `max_age` 秒より古いトラックを削除し、削除したIDを返す
    pub fn drop_stale(&mut self, sim_time: f64, max_age: f64) -> Vec<IdRecord> {
        let stale: Vec<IdRecord> = self
            .tracks
            .values()
            .filter(|t| t.time_since_collection(sim_time) > max_age)
            .map(|t| t.id)
            .collect();
        for id in &stale {
            self.tracks.remove(id);
        }
        stale
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_track() -> TrackRecord {
        let position = PositionRecord::from_lla_deg(35.0, 139.0, 5_000.0);
        TrackRecord::new(IdRecord::new(100, 1), position, Vector3::new(0.0, 0.0, 250.0), 10.0)
    }

    #[test]
    fn test_extrapolated_moves_along_velocity() {
        let track = sample_track();
        let projected = track.extrapolated(4.0);
        let moved = projected.position.ecef() - track.position.ecef();
        assert!((moved.z - 1_000.0).abs() < 1e-6);
        assert_eq!(projected.time, 14.0);
        // 元のトラックは変化しない
        assert_eq!(track.time, 10.0);
    }

    #[test]
    fn test_time_since_collection() {
        let track = sample_track();
        assert_eq!(track.time_since_collection(12.5), 2.5);
        assert_eq!(track.time_since_collection(5.0), 0.0);
    }

    #[test]
    fn test_iff_engageable() {
        assert!(IffType::Hostile.is_engageable());
        assert!(IffType::Unknown.is_engageable());
        assert!(!IffType::Friendly.is_engageable());
    }

    #[test]
    fn test_track_db_upsert_and_stale_drop() {
        let mut db = TrackDb::new();
        assert!(db.upsert(sample_track()).is_none());

        let mut newer = sample_track();
        newer.time = 30.0;
        newer.id = IdRecord::new(100, 2);
        db.upsert(newer);

        let mut refreshed = sample_track();
        refreshed.priority = 3.0;
        assert!(db.upsert(refreshed).is_some());
        assert_eq!(db.len(), 2);
        assert_eq!(db.get(&IdRecord::new(100, 1)).map(|t| t.priority), Some(3.0));

        let dropped = db.drop_stale(40.0, 15.0);
        assert_eq!(dropped, vec![IdRecord::new(100, 1)]);
        let ids: Vec<IdRecord> = db.snapshot().iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![IdRecord::new(100, 2)]);
    }
}
