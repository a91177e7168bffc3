//! # Intercept モジュール
//!
//! 等速直線運動する目標に対する迎撃点予測を提供します。
//!
//! - `predict_intercept`: 二次方程式 `(|v_t|² − v_s²)t² + 2(r·v_t)t + |r|² = 0`
//!   の最小正根を求める閉形式解
//! - `collision_intercept_time`: 視線方向・直交方向に分解した相対速度による解
//!   （航空迎撃機向け）
//! - `VclInterceptCalculator`: 上記を用いた `InterceptCalculator` 実装

use tracing::trace;

use crate::models::{InterceptCalculator, InterceptSolution, PositionRecord, TrackRecord, Vector3, WeaponCategory, WeaponRecord};

/// 既定の退化判定しきい値
pub const DEFAULT_EPSILON: f64 = 1e-9;

/// 既に会合しているとみなす距離（m）
const COLOCATED_DISTANCE_M: f64 = 1e-4;

/// 迎撃予測結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InterceptPrediction {
    pub time_s: f64,
    pub point: Vector3,
}

/// 迎撃点を予測
///
/// `r = 目標位置 − 射手位置` として二次方程式を解き、最小の正根を採用します。
/// 先頭係数が `epsilon` 以下なら一次式 `t = −c/b` に退化させ、`b` も
/// `epsilon` 以下なら迎撃不能とします。判別式が負の場合も迎撃不能です。
///
/// # 引数
///
/// * `target_pos` - 目標位置（ECEF, m）
/// * `target_vel` - 目標速度（ECEF, m/s）
/// * `shooter_pos` - 射手位置（ECEF, m）
/// * `intercept_speed` - 平均迎撃速度（m/s）
/// * `epsilon` - 退化判定しきい値
///
/// # 戻り値
///
/// 迎撃可能なら迎撃時刻と迎撃点、不能なら `None`
pub fn predict_intercept(
    target_pos: &Vector3,
    target_vel: &Vector3,
    shooter_pos: &Vector3,
    intercept_speed: f64,
    epsilon: f64,
) -> Option<InterceptPrediction> {
    let r = *target_pos - *shooter_pos;
    let c = r.magnitude_squared();
    if c.sqrt() <= COLOCATED_DISTANCE_M {
        return Some(InterceptPrediction { time_s: 0.0, point: *target_pos });
    }

    let a = target_vel.magnitude_squared() - intercept_speed * intercept_speed;
    let b = 2.0 * r.dot(target_vel);

    let time = if a.abs() <= epsilon {
        if b.abs() <= epsilon {
            return None;
        }
        let t = -c / b;
        if t > 0.0 { t } else { return None; }
    } else {
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return None;
        }
        let root = discriminant.sqrt();
        let t1 = (-b - root) / (2.0 * a);
        let t2 = (-b + root) / (2.0 * a);
        match (t1 > 0.0, t2 > 0.0) {
            (true, true) => t1.min(t2),
            (true, false) => t1,
            (false, true) => t2,
            (false, false) => return None,
        }
    };

    Some(InterceptPrediction { time_s: time, point: *target_pos + *target_vel * time })
}

/// 相対速度分解による迎撃時間
///
/// 目標速度を視線方向成分 `Sta` と直交成分 `Stn` に分け、迎撃体が直交成分を
/// 打ち消したうえで残る視線方向の接近速度 `sqrt(Si² − Stn²) − Sta` で距離を割ります。
/// 接近速度が得られない場合は `None` です。
pub fn collision_intercept_time(
    target_pos: &Vector3,
    target_vel: &Vector3,
    shooter_pos: &Vector3,
    intercept_speed: f64,
) -> Option<f64> {
    let r = *target_pos - *shooter_pos;
    let distance = r.magnitude();
    if distance <= COLOCATED_DISTANCE_M {
        return Some(0.0);
    }

    let along = target_vel.dot(&r) / distance;
    let normal_sq = (target_vel.magnitude_squared() - along * along).max(0.0);
    let usable_sq = intercept_speed * intercept_speed - normal_sq;
    if usable_sq <= 0.0 {
        return None;
    }

    let closing_speed = usable_sq.sqrt() - along;
    if closing_speed <= 1e-6 {
        return None;
    }
    Some(distance / closing_speed)
}

/// 閉形式の迎撃計算器
///
/// 航空迎撃機（AI）は相対速度分解、それ以外は二次方程式で解きます。
/// 射程判定はペアリング側で行うため、ここでは幾何解のみを返します。
#[derive(Debug, Clone, Copy)]
pub struct VclInterceptCalculator {
    pub epsilon: f64,
}

impl Default for VclInterceptCalculator {
    fn default() -> Self {
        Self { epsilon: DEFAULT_EPSILON }
    }
}

impl InterceptCalculator for VclInterceptCalculator {
    fn can_intercept(
        &self,
        track: &TrackRecord,
        weapon: &WeaponRecord,
        weapon_position: &PositionRecord,
    ) -> Option<InterceptSolution> {
        if weapon.intercept_speed_mps <= 0.0 {
            trace!(weapon = %weapon.weapon_ref(), "迎撃速度が未設定のため迎撃不能");
            return None;
        }

        let target_pos = track.position.ecef();
        let shooter_pos = weapon_position.ecef();

        let prediction = match weapon.category {
            WeaponCategory::Ai => {
                collision_intercept_time(&target_pos, &track.velocity, &shooter_pos, weapon.intercept_speed_mps)
                    .map(|time_s| InterceptPrediction { time_s, point: target_pos + track.velocity * time_s })
            }
            WeaponCategory::Sam | WeaponCategory::Other => {
                predict_intercept(&target_pos, &track.velocity, &shooter_pos, weapon.intercept_speed_mps, self.epsilon)
            }
        }?;

        Some(InterceptSolution {
            time_s: prediction.time_s,
            point: PositionRecord::from_ecef(prediction.point),
            pk: weapon.estimated_pk,
            max_range_m: weapon.max_range_m.unwrap_or(f64::INFINITY),
        })
    }
}
