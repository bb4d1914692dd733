//! Pursuit parameters

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct PursuitParams {
    /// Below this person area fraction the robot approaches
    pub min_area: f64,

    /// Above this person area fraction the robot retreats
    pub max_area: f64,

    /// Range at or below which the path counts as blocked.
    ///
    /// Units: centimeters
    pub safe_distance_cm: f64,

    /// Base approach and retreat speed.
    ///
    /// Units: percent
    pub speed: f64,

    /// Extra speed per unit of relative area error, so the robot closes large gaps faster.
    ///
    /// Units: percent
    pub speed_gain: f64,

    /// Speed of the re-centring pivots made while holding distance.
    ///
    /// Units: percent
    pub hold_turn_speed: f64,

    /// Time a new distance band must be observed continuously before it is acted on, zero to act
    /// immediately.
    ///
    /// Units: seconds
    pub band_settle_s: f64,
}

impl Default for PursuitParams {
    fn default() -> Self {
        Self {
            min_area: 0.35,
            max_area: 0.5,
            safe_distance_cm: 50.0,
            speed: 50.0,
            speed_gain: 50.0,
            hold_turn_speed: 50.0,
            band_settle_s: 0.0,
        }
    }
}
