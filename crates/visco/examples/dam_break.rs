//! Dam break diagnostic
//!
//! Drops a jittered block of fluid into a closed box with one slanted
//! obstacle wall and prints settling statistics.
//!
//! Run with: cargo run --example dam_break --release

use glam::Vec3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use visco::{QuadWall, SimConfig, Simulation};

const DT: f32 = 1.0 / 120.0;
const STEPS: usize = 1200;

fn main() {
    let cfg = SimConfig {
        bounds_min: Vec3::new(-2.0, 0.0, -2.0),
        bounds_max: Vec3::new(2.0, 6.0, 2.0),
        plasticity: true,
        ..Default::default()
    };
    let spacing = cfg.h / 2.0;
    let mut sim = Simulation::new(cfg).expect("valid config");

    // A ramp leaning through the middle of the box.
    sim.add_obstacle(
        QuadWall::new(
            Vec3::new(-1.5, 0.2, -1.5),
            Vec3::new(2.5, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 3.0),
        )
        .expect("valid wall"),
    );

    // Jittered block in one corner, the dam.
    let mut rng = StdRng::seed_from_u64(7);
    for i in 0..8 {
        for j in 0..12 {
            for k in 0..8 {
                let jitter = Vec3::new(
                    rng.random_range(-0.01..0.01),
                    rng.random_range(-0.01..0.01),
                    rng.random_range(-0.01..0.01),
                );
                sim.add_particle(
                    Vec3::new(
                        -1.8 + i as f32 * spacing,
                        2.0 + j as f32 * spacing,
                        -0.875 + k as f32 * spacing,
                    ) + jitter,
                );
            }
        }
    }
    println!("particles: {}", sim.particle_count());

    for frame in 1..=STEPS {
        sim.step(DT);

        if frame % 120 == 0 {
            let positions = sim.positions();
            let avg_y: f32 =
                positions.iter().map(|p| p.y).sum::<f32>() / positions.len() as f32;
            let max_speed = sim
                .velocities()
                .iter()
                .map(|v| v.length())
                .fold(0.0f32, f32::max);
            println!(
                "t = {:5.2}s | avg height {:.3} | max speed {:.3} | springs {} | center density {:.3}",
                frame as f32 * DT,
                avg_y,
                max_speed,
                sim.spring_count(),
                sim.density_at(Vec3::new(0.0, 0.5, 0.0)),
            );
        }
    }
}
