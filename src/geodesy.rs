//! # Geodesy モジュール
//!
//! WGS84楕円体に基づく座標変換と大圏距離を提供します。
//!
//! - 測地座標（緯度・経度・高度）→ ECEF
//! - ECEF → 測地座標（反復なしの閉形式近似）
//! - NED速度 → ECEF速度
//! - haversine式による大圏距離
//!
//! ## 逆変換の精度について
//!
//! `ecef_to_geodetic` は反復計算を行わない閉形式の近似解です。地表近傍では
//! サブミリメートル程度の誤差で往復しますが、厳密解ではありません。
//! 高精度な逆変換が必要な呼び出し側は許容誤差を確認してください。

use crate::models::Vector3;

/// WGS84 長半径（m）
pub const WGS84_A: f64 = 6_378_137.0;
/// WGS84 扁平率
pub const WGS84_F: f64 = 1.0 / 298.257_223_563;
/// WGS84 短半径（m）
pub const WGS84_B: f64 = WGS84_A * (1.0 - WGS84_F);
/// 第一離心率の二乗
pub const WGS84_E2: f64 = WGS84_F * (2.0 - WGS84_F);
/// 第二離心率の二乗
pub const WGS84_EP2: f64 = (WGS84_A * WGS84_A - WGS84_B * WGS84_B) / (WGS84_B * WGS84_B);
/// 大圏距離に使う地球平均半径（m）
pub const EARTH_MEAN_RADIUS_M: f64 = 6_371_000.0;

/// 測地座標をECEF座標に変換
///
/// # 引数
///
/// * `lat_rad` - 緯度（ラジアン）
/// * `lon_rad` - 経度（ラジアン）
/// * `alt_m` - 楕円体高（メートル）
pub fn geodetic_to_ecef(lat_rad: f64, lon_rad: f64, alt_m: f64) -> Vector3 {
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();
    let re = WGS84_A / (1.0 - WGS84_E2 * sin_lat * sin_lat).sqrt();

    Vector3::new(
        (re + alt_m) * cos_lat * cos_lon,
        (re + alt_m) * cos_lat * sin_lon,
        (re * (1.0 - WGS84_E2) + alt_m) * sin_lat,
    )
}

/// ECEF座標を測地座標に変換
///
/// 反復なしの閉形式解です。戻り値は `(緯度rad, 経度rad, 高度m)` です。
/// 自転軸上（赤道面からの距離がほぼ0）の点は極として扱います。
pub fn ecef_to_geodetic(ecef: &Vector3) -> (f64, f64, f64) {
    let a = WGS84_A;
    let b = WGS84_B;
    let e2 = WGS84_E2;
    let z = ecef.z;
    let r = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();

    if r < 1e-9 {
        let lat = if z >= 0.0 {
            std::f64::consts::FRAC_PI_2
        } else {
            -std::f64::consts::FRAC_PI_2
        };
        return (lat, 0.0, z.abs() - b);
    }

    let big_e2 = a * a - b * b;
    let f = 54.0 * b * b * z * z;
    let g = r * r + (1.0 - e2) * z * z - e2 * big_e2;
    let c = e2 * e2 * f * r * r / (g * g * g);
    let s = (1.0 + c + (c * c + 2.0 * c).sqrt()).cbrt();
    let k = s + 1.0 / s + 1.0;
    let p = f / (3.0 * k * k * g * g);
    let q = (1.0 + 2.0 * e2 * e2 * p).sqrt();
    let r0 = -(p * e2 * r) / (1.0 + q)
        + (0.5 * a * a * (1.0 + 1.0 / q)
            - p * (1.0 - e2) * z * z / (q * (1.0 + q))
            - 0.5 * p * r * r)
            .max(0.0)
            .sqrt();
    let dr = r - e2 * r0;
    let u = (dr * dr + z * z).sqrt();
    let v = (dr * dr + (1.0 - e2) * z * z).sqrt();
    let z0 = b * b * z / (a * v);

    let alt = u * (1.0 - b * b / (a * v));
    let lat = ((z + WGS84_EP2 * z0) / r).atan();
    let lon = ecef.y.atan2(ecef.x);
    (lat, lon, alt)
}

/// 局所NED速度をECEF速度に変換
pub fn ned_to_ecef_velocity(lat_rad: f64, lon_rad: f64, north: f64, east: f64, down: f64) -> Vector3 {
    let (sin_lat, cos_lat) = lat_rad.sin_cos();
    let (sin_lon, cos_lon) = lon_rad.sin_cos();

    Vector3::new(
        -sin_lat * cos_lon * north - sin_lon * east - cos_lat * cos_lon * down,
        -sin_lat * sin_lon * north + cos_lon * east - cos_lat * sin_lon * down,
        cos_lat * north - sin_lat * down,
    )
}

/// 大圏距離（メートル）
///
/// 球面近似（平均半径）でのhaversine式です。
pub fn great_circle_distance(lat1_rad: f64, lon1_rad: f64, lat2_rad: f64, lon2_rad: f64) -> f64 {
    let d_lat = lat2_rad - lat1_rad;
    let d_lon = lon2_rad - lon1_rad;

    let h = (d_lat / 2.0).sin().powi(2) + lat1_rad.cos() * lat2_rad.cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_MEAN_RADIUS_M * c
}

/// 大圏航路の初期方位（ラジアン、北基準・時計回り、[0, 2π)）
pub fn initial_bearing(lat1_rad: f64, lon1_rad: f64, lat2_rad: f64, lon2_rad: f64) -> f64 {
    let d_lon = lon2_rad - lon1_rad;
    let y = d_lon.sin() * lat2_rad.cos();
    let x = lat1_rad.cos() * lat2_rad.sin() - lat1_rad.sin() * lat2_rad.cos() * d_lon.cos();
    y.atan2(x).rem_euclid(std::f64::consts::TAU)
}
