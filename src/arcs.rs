use bevy::prelude::Vec2;
use serde::{Deserialize, Serialize};

use crate::geometry::{Bounds, Direction};

/// Ballistic capabilities used to pre-sample arc envelopes.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct Ballistics {
    /// Gravity magnitude, world units per second squared.
    pub gravity: f32,
    pub jump_velocity: f32,
    pub run_speed: f32,
    /// Downward speed clamp, matching the host controller's terminal
    /// velocity.
    pub max_fall_speed: f32,
    pub sample_count: usize,
    pub sample_interval: f32,
    /// Fraction of the full jump impulse assumed reachable in practice.
    pub jump_scale: f32,
}

impl Default for Ballistics {
    fn default() -> Self {
        Self {
            gravity: 980.0,
            jump_velocity: 400.0,
            run_speed: 200.0,
            max_fall_speed: 800.0,
            sample_count: 25,
            sample_interval: 0.05,
            jump_scale: 0.98,
        }
    }
}

/// Pre-sampled swept boxes of the agent's jump and fall arcs, relative to a
/// launch point at the agent's feet, plus their union envelopes.
///
/// The envelopes always contain every sample and the launch box itself, so
/// a single rectangle query finds everything the arcs might touch.
#[derive(Clone, Debug)]
pub struct ArcProfile {
    body: Vec2,
    jump_left: Vec<Bounds>,
    jump_right: Vec<Bounds>,
    fall_left: Vec<Bounds>,
    fall_right: Vec<Bounds>,
    jump_left_bounds: Bounds,
    jump_right_bounds: Bounds,
    fall_left_bounds: Bounds,
    fall_right_bounds: Bounds,
}

impl ArcProfile {
    /// Build a profile from sample boxes the host controller computed
    /// itself. All boxes are relative to the launch point.
    pub fn from_samples(
        body: Vec2,
        jump_left: Vec<Bounds>,
        jump_right: Vec<Bounds>,
        fall_left: Vec<Bounds>,
        fall_right: Vec<Bounds>,
    ) -> Self {
        let launch = Bounds::from_center(Vec2::new(0.0, body.y * 0.5), body);
        let envelope = |samples: &[Bounds]| {
            samples.iter().fold(launch, |acc, b| acc.merge(b))
        };
        Self {
            body,
            jump_left_bounds: envelope(&jump_left),
            jump_right_bounds: envelope(&jump_right),
            fall_left_bounds: envelope(&fall_left),
            fall_right_bounds: envelope(&fall_right),
            jump_left,
            jump_right,
            fall_left,
            fall_right,
        }
    }

    /// Default sampler: integrate the ballistic model at fixed intervals,
    /// sweeping the agent's box sideways at run speed while gravity pulls
    /// it down, with the jump launched at a slightly conservative impulse.
    pub fn sample(body: Vec2, ballistics: &Ballistics) -> Self {
        let jump_impulse = ballistics.jump_velocity * ballistics.jump_scale;
        Self::from_samples(
            body,
            sample_arc(body, ballistics, Direction::Left, jump_impulse),
            sample_arc(body, ballistics, Direction::Right, jump_impulse),
            sample_arc(body, ballistics, Direction::Left, 0.0),
            sample_arc(body, ballistics, Direction::Right, 0.0),
        )
    }

    pub fn body(&self) -> Vec2 {
        self.body
    }

    /// The agent's box standing with its feet at `feet`.
    pub fn body_at(&self, feet: Vec2) -> Bounds {
        Bounds::from_center(feet + Vec2::new(0.0, self.body.y * 0.5), self.body)
    }

    pub fn jump_samples(&self, direction: Direction) -> &[Bounds] {
        match direction {
            Direction::Left => &self.jump_left,
            Direction::Right => &self.jump_right,
        }
    }

    pub fn fall_samples(&self, direction: Direction) -> &[Bounds] {
        match direction {
            Direction::Left => &self.fall_left,
            Direction::Right => &self.fall_right,
        }
    }

    pub fn jump_bounds(&self, direction: Direction) -> Bounds {
        match direction {
            Direction::Left => self.jump_left_bounds,
            Direction::Right => self.jump_right_bounds,
        }
    }

    pub fn fall_bounds(&self, direction: Direction) -> Bounds {
        match direction {
            Direction::Left => self.fall_left_bounds,
            Direction::Right => self.fall_right_bounds,
        }
    }
}

fn sample_arc(
    body: Vec2,
    ballistics: &Ballistics,
    direction: Direction,
    initial_vy: f32,
) -> Vec<Bounds> {
    let dt = ballistics.sample_interval;
    let mut vy = initial_vy;
    let mut y = 0.0f32;
    let mut out = Vec::with_capacity(ballistics.sample_count);
    for step in 1..=ballistics.sample_count {
        vy = (vy - ballistics.gravity * dt).max(-ballistics.max_fall_speed);
        y += vy * dt;
        let x = direction.sign() * ballistics.run_speed * step as f32 * dt;
        out.push(Bounds::from_center(
            Vec2::new(x, y + body.y * 0.5),
            body,
        ));
    }
    out
}
