//! Headless demo: an agent collecting coins for a vending machine.

use anyhow::Result;
use playground_core::{
    AgentActions, AgentId, AgentSpec, AreaShape, CoordinateSampler, EntitySpec, Field, Playground,
    PlaygroundConfig, Pose, SceneRaster, SensorSpec, Vec2,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, warn};

const RUN_STEPS: u64 = 2_000;

fn main() -> Result<()> {
    init_tracing();
    let (mut playground, agent) = build_coin_master()?;
    info!("Starting coin-master playground shell");
    run(&mut playground, agent)?;
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// The agent should collect coins, grasp them, and bring them to the vending
/// machine to collect rewards.
fn build_coin_master() -> Result<(Playground, AgentId)> {
    let config = PlaygroundConfig {
        time_limit: Some(RUN_STEPS),
        rng_seed: Some(0xFACA_DEAF_0123_4567),
        ..PlaygroundConfig::default()
    };
    let mut playground = Playground::new(config)?;

    playground.add_entity(EntitySpec::vending_machine(Pose::new(150.0, 150.0, 0.0)))?;

    let production_area = CoordinateSampler::new(
        Vec2::new(50.0, 150.0),
        AreaShape::Rectangle {
            width: 80.0,
            length: 80.0,
        },
    )?;
    playground.add_field(Field::new(
        EntitySpec::coin(Pose::new(0.0, 0.0, 0.0), 1.0),
        production_area,
        5,
        1_000,
    ));

    let start_area = CoordinateSampler::new(
        Vec2::new(50.0, 50.0),
        AreaShape::Rectangle {
            width: 80.0,
            length: 80.0,
        },
    )?;
    let spec = AgentSpec {
        sensors: vec![SensorSpec::forward(
            80.0,
            std::f32::consts::PI,
            64,
        )],
        ..AgentSpec::default()
    };
    let agent = playground.add_agent(&spec, start_area)?;
    Ok((playground, agent))
}

/// Random continuous controller in the spirit of the classic baselines.
fn random_actions(rng: &mut SmallRng) -> AgentActions {
    AgentActions {
        longitudinal: rng.random_range(-1.0..1.0),
        lateral: rng.random_range(-0.3..0.3),
        rotation: rng.random_range(-1.0..1.0),
        eat: rng.random::<f32>() < 0.3,
        activate: rng.random::<f32>() < 0.3,
        grasp: rng.random::<f32>() < 0.7,
    }
}

fn run(playground: &mut Playground, agent: AgentId) -> Result<()> {
    let mut rng = SmallRng::seed_from_u64(0x5EED_CAFE);
    let mut total_reward = 0.0_f32;

    loop {
        let actions = random_actions(&mut rng);
        let events = playground.step(&[(agent, actions)]);
        total_reward += events
            .rewards
            .iter()
            .map(|(_, reward)| reward)
            .sum::<f32>();

        if events.tick.0.is_multiple_of(500)
            && let Some(summary) = playground.history().last()
        {
            info!(
                tick = summary.tick.0,
                entities = summary.entity_count,
                step_reward = summary.total_reward,
                total_reward,
                "checkpoint",
            );
        }
        if events.done {
            break;
        }
    }

    // One demonstration capture against a blank raster; real deployments
    // feed the raster from an external renderer.
    let raster = SceneRaster::new(128, 128, 3, vec![0.0; 128 * 128 * 3])?;
    match playground.collect_observations(&raster) {
        Ok(frames) => {
            for frame in frames {
                for observation in &frame.observations {
                    let (rows, cols, channels) = observation.dims();
                    info!(agent = ?frame.agent, rows, cols, channels, "sensor frame captured");
                }
            }
        }
        Err(err) => warn!(%err, "observation capture failed"),
    }

    info!(
        steps = playground.tick().0,
        total_reward, "run finished"
    );
    Ok(())
}
