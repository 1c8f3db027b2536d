//! Ground trajectories the body is walked along.

use body_core::{BodyResult, Trajectory};
use nalgebra::{Point2, Vector2};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Straight line along +x
    Straight,

    /// Counter-clockwise circle of radius 3 m
    Circle,

    /// Heading alternating ±45° every 2 s
    Zigzag,

    /// Straight line along the (1, 1) diagonal
    Diagonal,
}

/// Radius of the circle scenario (m).
const CIRCLE_RADIUS: f64 = 3.0;

/// Time between zigzag turns (s).
const ZIGZAG_LEG: f64 = 2.0;

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Straight,
            ScenarioId::Circle,
            ScenarioId::Zigzag,
            ScenarioId::Diagonal,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Straight => "straight",
            ScenarioId::Circle => "circle",
            ScenarioId::Zigzag => "zigzag",
            ScenarioId::Diagonal => "diagonal",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Straight => "Walk along +x at gait speed",
            ScenarioId::Circle => "Walk a 3 m circle counter-clockwise",
            ScenarioId::Zigzag => "Turn ±45° every 2 s",
            ScenarioId::Diagonal => "Walk along the (1, 1) diagonal, off the capture heading",
        }
    }

    /// Walking direction at time `t`.
    fn heading(&self, t: f64, speed: f64) -> Vector2<f64> {
        match self {
            ScenarioId::Straight => Vector2::x(),
            ScenarioId::Diagonal => Vector2::new(1.0, 1.0).normalize(),
            ScenarioId::Circle => {
                let theta = speed * t / CIRCLE_RADIUS;
                Vector2::new(-theta.sin(), theta.cos())
            }
            ScenarioId::Zigzag => {
                let leg = (t / ZIGZAG_LEG).floor() as i64;
                let angle = if leg % 2 == 0 { 1.0 } else { -1.0 } * std::f64::consts::FRAC_PI_4;
                Vector2::new(angle.cos(), angle.sin())
            }
        }
    }

    /// Ground positions sampled every `dt` seconds over `[0, duration]`.
    pub fn ground_path(&self, duration: f64, speed: f64, dt: f64) -> (Vec<f64>, Vec<Point2<f64>>) {
        let n = (duration / dt).round().max(1.0) as usize;
        let mut times = Vec::with_capacity(n + 1);
        let mut points = Vec::with_capacity(n + 1);

        let mut p = match self {
            ScenarioId::Circle => Point2::new(CIRCLE_RADIUS, 0.0),
            _ => Point2::origin(),
        };
        for k in 0..=n {
            let t = k as f64 * dt;
            times.push(t);
            points.push(p);
            p += self.heading(t, speed) * speed * dt;
        }
        (times, points)
    }

    /// Timestamped trajectory with unit velocities.
    pub fn trajectory(&self, duration: f64, speed: f64, dt: f64) -> BodyResult<Trajectory> {
        let (times, points) = self.ground_path(duration, speed, dt);
        Trajectory::from_positions(&times, &points)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "straight" | "line" => Ok(ScenarioId::Straight),
            "circle" => Ok(ScenarioId::Circle),
            "zigzag" | "zig_zag" => Ok(ScenarioId::Zigzag),
            "diagonal" => Ok(ScenarioId::Diagonal),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_names() {
        for scenario in ScenarioId::all() {
            assert_eq!(scenario.name().parse::<ScenarioId>().unwrap(), scenario);
        }
        assert!("moonwalk".parse::<ScenarioId>().is_err());
    }

    #[test]
    fn test_straight_trajectory() {
        let traj = ScenarioId::Straight.trajectory(4.0, 1.5, 0.05).unwrap();
        assert_eq!(traj.len(), 81);
        assert_relative_eq!(traj.t_max(), 4.0, epsilon = 1e-9);
        assert_relative_eq!(traj.position(80).unwrap(), Point2::new(6.0, 0.0), epsilon = 1e-9);
    }

    #[test]
    fn test_circle_stays_near_radius() {
        let (_, points) = ScenarioId::Circle.ground_path(10.0, 1.2, 0.01);
        for p in points {
            assert!((p.coords.norm() - CIRCLE_RADIUS).abs() < 0.05);
        }
    }

    #[test]
    fn test_zigzag_alternates() {
        let traj = ScenarioId::Zigzag.trajectory(6.0, 1.0, 0.1).unwrap();
        let first = traj.direction(5).unwrap();
        let second = traj.direction(25).unwrap();
        assert!(first.y > 0.0);
        assert!(second.y < 0.0);
        assert_relative_eq!(first.x, second.x, epsilon = 1e-9);
    }
}
