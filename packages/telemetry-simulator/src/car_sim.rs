//! car_sim.rs — Single-car physics for synthetic Dash telemetry
//!
//! One car lapping a circular track with a speed profile that dips into
//! `corners` slow sections per lap. Good enough to make every gauge on a
//! dashboard move plausibly:
//! - longitudinal drive/brake/drag model with a simple torque curve
//! - automatic gearbox (upshift / downshift thresholds from the profile)
//! - lap timing, fuel burn, tire temperature and wear
//! - small sensor noise on accelerations and suspension

use std::f64::consts::{PI, TAU};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

/// Profile used when no `--config` is given.
pub const DEFAULT_PROFILE: &str = include_str!("../config.toml");

const GRAVITY: f64 = 9.81;
const ROLLING_RESISTANCE: f64 = 0.015;
/// Above this lateral acceleration the tires stop gaining grip-related heat.
const MAX_LATERAL_MPS2: f64 = 15.0;

// ── Config (populated from config.toml) ───────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct SimConfig {
    pub car: CarProfile,
    pub track: TrackProfile,
    pub simulation: SimulationConfig,
}

impl SimConfig {
    pub fn from_toml(raw: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(raw)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CarProfile {
    pub mass_kg: f64,
    pub max_power_w: f64,
    pub max_torque_nm: f64,
    pub idle_rpm: f64,
    pub max_rpm: f64,
    pub upshift_rpm: f64,
    pub downshift_rpm: f64,
    pub gear_ratios: Vec<f64>,
    pub final_drive: f64,
    pub wheel_radius_m: f64,
    pub brake_decel_mps2: f64,
    pub drag_coefficient: f64,
    /// Fraction of a full tank burned per second at full throttle.
    pub fuel_burn_per_s: f64,
    pub car_ordinal: i32,
    pub car_class: i32,
    pub performance_index: i32,
    pub drivetrain: i32,
    pub cylinders: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackProfile {
    pub lap_length_m: f64,
    pub corners: u32,
    pub min_corner_speed_mps: f64,
    pub max_speed_mps: f64,
    pub track_ordinal: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub rate_hz: f64,
    pub ambient_temp_c: f64,
}

// ── Car state ─────────────────────────────────────────────────────────────────

/// Wheel order matches the wire layout: FL, FR, RL, RR.
const WHEELS: [&str; 4] = ["FrontLeft", "FrontRight", "RearLeft", "RearRight"];

pub struct CarSim {
    car: CarProfile,
    track: TrackProfile,
    ambient_c: f64,
    rng: StdRng,

    pub t_elapsed: f64,
    pub distance_m: f64,
    pub lap_distance_m: f64,
    pub speed_mps: f64,
    pub long_accel_mps2: f64,
    pub lat_accel_mps2: f64,
    pub rpm: f64,
    /// 1-based
    pub gear: usize,
    pub throttle: f64,
    pub brake: f64,
    pub steer: f64,

    pub lap_number: u16,
    pub current_lap_s: f64,
    pub last_lap_s: f64,
    /// 0.0 until the first lap completes.
    pub best_lap_s: f64,

    /// 1.0 = full tank
    pub fuel: f64,
    pub tire_temp_c: [f64; 4],
    pub tire_wear: [f64; 4],
    pub suspension: [f64; 4],
}

impl CarSim {
    pub fn new(cfg: &SimConfig, seed: u64) -> Self {
        let ambient_c = cfg.simulation.ambient_temp_c;
        let mut sim = Self {
            car: cfg.car.clone(),
            track: cfg.track.clone(),
            ambient_c,
            rng: StdRng::seed_from_u64(seed),
            t_elapsed: 0.0,
            distance_m: 0.0,
            lap_distance_m: 0.0,
            // Rolling start at corner speed so the first tick already moves.
            speed_mps: cfg.track.min_corner_speed_mps,
            long_accel_mps2: 0.0,
            lat_accel_mps2: 0.0,
            rpm: cfg.car.idle_rpm,
            gear: 1,
            throttle: 0.0,
            brake: 0.0,
            steer: 0.0,
            lap_number: 0,
            current_lap_s: 0.0,
            last_lap_s: 0.0,
            best_lap_s: 0.0,
            fuel: 1.0,
            tire_temp_c: [ambient_c; 4],
            tire_wear: [0.0; 4],
            suspension: [0.5; 4],
        };
        sim.select_gear();
        sim
    }

    pub fn top_gear(&self) -> usize {
        self.car.gear_ratios.len().max(1)
    }

    fn track_radius(&self) -> f64 {
        self.track.lap_length_m / TAU
    }

    /// Target speed at a point on the lap: full speed on straights, dipping to
    /// the corner speed at each of the `corners` apexes.
    fn target_speed(&self, lap_distance_m: f64) -> f64 {
        let t = &self.track;
        let phase = TAU * f64::from(t.corners) * lap_distance_m / t.lap_length_m;
        t.min_corner_speed_mps + (t.max_speed_mps - t.min_corner_speed_mps) * (0.5 + 0.5 * phase.cos())
    }

    /// 0.0 on a straight, 1.0 at an apex.
    fn corner_load(&self) -> f64 {
        let t = &self.track;
        let span = (t.max_speed_mps - t.min_corner_speed_mps).max(f64::EPSILON);
        (1.0 - (self.target_speed(self.lap_distance_m) - t.min_corner_speed_mps) / span).clamp(0.0, 1.0)
    }

    fn gear_ratio(&self) -> f64 {
        self.car
            .gear_ratios
            .get(self.gear.saturating_sub(1))
            .copied()
            .unwrap_or(1.0)
            * self.car.final_drive
    }

    /// Wheel speed in revolutions per minute.
    pub fn wheel_rpm(&self) -> f64 {
        self.speed_mps / self.car.wheel_radius_m * 60.0 / TAU
    }

    fn engine_rpm(&self) -> f64 {
        (self.wheel_rpm() * self.gear_ratio()).clamp(self.car.idle_rpm, self.car.max_rpm)
    }

    /// Crank torque at the current rpm, capped by the power limit.
    pub fn torque_nm(&self) -> f64 {
        let c = &self.car;
        let peak = 0.7;
        let shape = 1.0 - ((self.rpm / c.max_rpm) - peak).abs() / peak;
        let curve = c.max_torque_nm * (0.75 + 0.25 * shape.max(0.0));
        let omega = self.rpm * TAU / 60.0;
        if omega > 0.0 {
            curve.min(c.max_power_w / omega)
        } else {
            curve
        }
    }

    /// Power delivered at the crank, watts.
    pub fn power_w(&self) -> f64 {
        self.throttle * self.torque_nm() * self.rpm * TAU / 60.0
    }

    fn select_gear(&mut self) {
        self.rpm = self.engine_rpm();
        while self.rpm >= self.car.upshift_rpm && self.gear < self.top_gear() {
            self.gear += 1;
            self.rpm = self.engine_rpm();
        }
        while self.rpm < self.car.downshift_rpm && self.gear > 1 {
            self.gear -= 1;
            self.rpm = self.engine_rpm();
            if self.rpm >= self.car.upshift_rpm {
                self.gear += 1;
                self.rpm = self.engine_rpm();
                break;
            }
        }
    }

    /// Advance the simulation by `dt` seconds.
    pub fn tick(&mut self, dt: f64) {
        if dt <= 0.0 {
            return;
        }
        self.t_elapsed += dt;
        self.drive(dt);
        self.advance(dt);
        self.select_gear();
        self.update_tires(dt);

        self.fuel = (self.fuel - self.car.fuel_burn_per_s * self.throttle * dt).max(0.0);
        for s in &mut self.suspension {
            let load = 0.5 - 0.01 * self.long_accel_mps2 + 0.02 * self.lat_accel_mps2.abs();
            *s = (load + self.rng.gen_range(-0.02..0.02)).clamp(0.0, 1.0);
        }
    }

    /// Driver inputs and longitudinal dynamics.
    fn drive(&mut self, dt: f64) {
        let c = &self.car;
        let braking_distance = self.speed_mps.powi(2) / (2.0 * c.brake_decel_mps2 * 0.7);
        let target = self
            .target_speed(self.lap_distance_m)
            .min(self.target_speed(self.lap_distance_m + braking_distance));

        if self.speed_mps < target {
            self.throttle = ((target - self.speed_mps) / 5.0).clamp(0.2, 1.0);
            self.brake = 0.0;
        } else if self.speed_mps > target + 1.0 {
            self.throttle = 0.0;
            self.brake = ((self.speed_mps - target) / 5.0).clamp(0.1, 1.0);
        } else {
            self.throttle = 0.3;
            self.brake = 0.0;
        }

        let c = &self.car;
        let drive_force = self.throttle * self.torque_nm() * self.gear_ratio() / c.wheel_radius_m;
        let drag = c.drag_coefficient * self.speed_mps.powi(2);
        let rolling = if self.speed_mps > 0.0 { ROLLING_RESISTANCE * c.mass_kg * GRAVITY } else { 0.0 };
        let accel = (drive_force - drag - rolling) / c.mass_kg - self.brake * c.brake_decel_mps2;

        let prev = self.speed_mps;
        self.speed_mps = (self.speed_mps + accel * dt).max(0.0);
        self.long_accel_mps2 = (self.speed_mps - prev) / dt;

        let load = self.corner_load();
        let corner_radius = (self.track.min_corner_speed_mps.powi(2) / (1.2 * GRAVITY)).max(1.0);
        self.lat_accel_mps2 = (load * self.speed_mps.powi(2) / corner_radius).min(MAX_LATERAL_MPS2);
        self.steer = (load * 0.6).clamp(-1.0, 1.0);
    }

    /// Distance, laps and timing.
    fn advance(&mut self, dt: f64) {
        let step = self.speed_mps * dt;
        self.distance_m += step;
        self.lap_distance_m += step;
        self.current_lap_s += dt;

        if self.lap_distance_m >= self.track.lap_length_m {
            self.lap_distance_m -= self.track.lap_length_m;
            self.last_lap_s = self.current_lap_s;
            if self.best_lap_s == 0.0 || self.last_lap_s < self.best_lap_s {
                self.best_lap_s = self.last_lap_s;
            }
            self.current_lap_s = 0.0;
            self.lap_number = self.lap_number.saturating_add(1);
        }
    }

    fn update_tires(&mut self, dt: f64) {
        let lat = self.lat_accel_mps2.abs();
        for (i, (temp, wear)) in self.tire_temp_c.iter_mut().zip(self.tire_wear.iter_mut()).enumerate() {
            let front = i < 2;
            let work = if front { 25.0 * self.brake } else { 15.0 * self.throttle };
            let target = self.ambient_c + 40.0 + 3.0 * lat + work;
            *temp += (target - *temp) * (0.1 * dt).min(1.0);
            *wear = (*wear + dt * (0.00002 + 0.00001 * lat)).min(1.0);
        }
    }

    /// Position on the circular track, metres (x, z); y is flat.
    pub fn position(&self) -> (f64, f64) {
        let theta = TAU * self.lap_distance_m / self.track.lap_length_m;
        let r = self.track_radius();
        (r * theta.cos(), r * theta.sin())
    }

    /// Heading in radians, wrapped to (-π, π].
    pub fn yaw(&self) -> f64 {
        let theta = TAU * self.lap_distance_m / self.track.lap_length_m + PI / 2.0;
        let wrapped = theta.rem_euclid(TAU);
        if wrapped > PI { wrapped - TAU } else { wrapped }
    }

    /// Every field the sim drives, in published units, ready for `PacketBuilder::set_all`.
    pub fn values(&mut self) -> Vec<(String, f64)> {
        let c = &self.car;
        let theta = TAU * self.lap_distance_m / self.track.lap_length_m;
        let (px, pz) = self.position();
        let wheel_rpm = self.wheel_rpm();
        let slip = 0.02 * self.throttle - 0.03 * self.brake;
        let noise_x = self.rng.gen_range(-0.05..0.05);
        let noise_y = self.rng.gen_range(-0.05..0.05);

        let mut v: Vec<(String, f64)> = vec![
            ("isRaceOn".into(), 1.0),
            ("timestampMs".into(), (self.t_elapsed * 1000.0).rem_euclid(f64::from(u32::MAX))),
            ("engineMaxRpm".into(), c.max_rpm),
            ("engineIdleRpm".into(), c.idle_rpm),
            ("currentEngineRpm".into(), self.rpm),
            ("accelerationX".into(), self.lat_accel_mps2 + noise_x),
            ("accelerationY".into(), noise_y),
            ("accelerationZ".into(), self.long_accel_mps2),
            ("velocityX".into(), -self.speed_mps * theta.sin()),
            ("velocityY".into(), 0.0),
            ("velocityZ".into(), self.speed_mps * theta.cos()),
            ("angularVelocityY".into(), self.speed_mps / self.track_radius()),
            ("yaw".into(), self.yaw()),
            ("pitch".into(), -0.002 * self.long_accel_mps2),
            ("roll".into(), 0.004 * self.lat_accel_mps2),
            ("carOrdinal".into(), f64::from(c.car_ordinal)),
            ("carClass".into(), f64::from(c.car_class)),
            ("carPerformanceIndex".into(), f64::from(c.performance_index)),
            ("drivetrainType".into(), f64::from(c.drivetrain)),
            ("numCylinders".into(), f64::from(c.cylinders)),
            ("positionX".into(), px),
            ("positionY".into(), 0.0),
            ("positionZ".into(), pz),
            ("speed".into(), self.speed_mps),
            ("power".into(), self.power_w()),
            ("torque".into(), self.throttle * self.torque_nm()),
            ("boost".into(), 0.0),
            ("fuel".into(), self.fuel),
            ("distanceTraveled".into(), self.distance_m),
            ("bestLap".into(), self.best_lap_s),
            ("lastLap".into(), self.last_lap_s),
            ("currentLap".into(), self.current_lap_s),
            ("currentRaceTime".into(), self.t_elapsed),
            ("lapNumber".into(), f64::from(self.lap_number)),
            ("racePosition".into(), 1.0),
            ("throttle".into(), self.throttle),
            ("brake".into(), self.brake),
            ("clutch".into(), 0.0),
            ("handBrake".into(), 0.0),
            ("gear".into(), self.gear as f64),
            ("steer".into(), self.steer),
            ("trackOrdinal".into(), f64::from(self.track.track_ordinal)),
        ];

        for (i, wheel) in WHEELS.iter().enumerate() {
            let temp_f = self.tire_temp_c[i] * 9.0 / 5.0 + 32.0;
            v.push((format!("suspensionTravel{wheel}"), self.suspension[i]));
            v.push((format!("suspensionTravelMeters{wheel}"), self.suspension[i] * 0.1));
            v.push((format!("tireSlipRatio{wheel}"), slip));
            v.push((format!("wheelRpm{wheel}"), wheel_rpm));
            v.push((format!("tireTemp{wheel}"), temp_f));
            v.push((format!("tireWear{wheel}"), self.tire_wear[i]));
        }
        v
    }
}
