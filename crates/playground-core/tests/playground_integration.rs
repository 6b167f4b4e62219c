use playground_core::{
    AgentActions, AgentSpec, AreaShape, CoordinateSampler, EntitySpec, Field, PhysicalShape,
    Playground, PlaygroundConfig, Pose, SceneRaster, SensorSpec, Tick, Trajectory, Vec2,
};

fn seeded_config(seed: u64) -> PlaygroundConfig {
    PlaygroundConfig {
        rng_seed: Some(seed),
        ..PlaygroundConfig::default()
    }
}

fn eat_action() -> AgentActions {
    AgentActions {
        eat: true,
        ..AgentActions::default()
    }
}

#[test]
fn seeded_playgrounds_advance_deterministically() {
    let build = |seed: u64| {
        let mut playground = Playground::new(seeded_config(seed)).expect("playground");
        playground
            .add_entity(EntitySpec::apple(Pose::new(120.0, 100.0, 0.0)))
            .expect("apple");
        let area = CoordinateSampler::new(
            Vec2::new(60.0, 60.0),
            AreaShape::Rectangle {
                width: 50.0,
                length: 50.0,
            },
        )
        .expect("area");
        playground.add_field(Field::new(
            EntitySpec::coin(Pose::default(), 1.0),
            area,
            2,
            10,
        ));
        // Seed-driven placement: different seeds start the agent elsewhere.
        let start_area = CoordinateSampler::new(
            Vec2::new(100.0, 100.0),
            AreaShape::Rectangle {
                width: 80.0,
                length: 80.0,
            },
        )
        .expect("start area");
        let agent = playground
            .add_agent(&AgentSpec::default(), start_area)
            .expect("agent");
        (playground, agent)
    };

    let (mut world_a, agent_a) = build(0xDEAD_BEEF);
    let (mut world_b, agent_b) = build(0xDEAD_BEEF);

    let actions = AgentActions {
        longitudinal: 0.6,
        rotation: 0.2,
        eat: true,
        ..AgentActions::default()
    };
    for _ in 0..30 {
        world_a.step(&[(agent_a, actions)]);
        world_b.step(&[(agent_b, actions)]);
    }

    assert_eq!(world_a.tick(), Tick(30));
    let history_a: Vec<_> = world_a.history().cloned().collect();
    let history_b: Vec<_> = world_b.history().cloned().collect();
    assert_eq!(
        history_a, history_b,
        "identical seeds should produce identical histories"
    );
    let pose_a = world_a.agent(agent_a).expect("agent").body.pose();
    let pose_b = world_b.agent(agent_b).expect("agent").body.pose();
    assert_eq!(pose_a, pose_b);

    let (mut world_c, agent_c) = build(0xF00D_F00D);
    for _ in 0..30 {
        world_c.step(&[(agent_c, actions)]);
    }
    let history_c: Vec<_> = world_c.history().cloned().collect();
    assert!(
        history_a != history_c
            || pose_a != world_c.agent(agent_c).expect("agent").body.pose(),
        "different seeds should diverge"
    );
}

#[test]
fn agent_eats_apple_to_depletion() {
    let mut playground = Playground::new(seeded_config(7)).expect("playground");
    playground
        .add_entity(EntitySpec::apple(Pose::new(100.0, 100.0, 0.0)))
        .expect("apple");
    let agent = playground
        .add_agent(&AgentSpec::default(), Pose::new(100.0, 100.0, 0.0))
        .expect("agent");

    let mut bite_rewards = Vec::new();
    let mut removed_total = 0;
    for _ in 0..30 {
        let events = playground.step(&[(agent, eat_action())]);
        removed_total += events.removed;
        let reward = events
            .rewards
            .iter()
            .find(|(id, _)| *id == agent)
            .map(|(_, r)| *r)
            .expect("reward entry");
        if reward > 0.0 {
            bite_rewards.push(reward);
        }
    }

    assert!((bite_rewards[0] - 30.0).abs() < 1e-4, "first bite credits the full reward");
    for pair in bite_rewards.windows(2) {
        assert!(
            pair[1] <= pair[0] + 1e-6,
            "reward magnitude must never increase: {pair:?}"
        );
    }
    assert_eq!(removed_total, 1, "apple must deplete and disappear");
    assert_eq!(playground.entity_count(), 0);
}

#[test]
fn carried_coin_deposits_into_vending_machine() {
    let mut playground = Playground::new(seeded_config(11)).expect("playground");
    let coin = playground
        .add_entity(EntitySpec::coin(Pose::new(116.0, 100.0, 0.0), 1.0))
        .expect("coin");
    let machine = playground
        .add_entity(EntitySpec::vending_machine(Pose::new(135.0, 100.0, 0.0)))
        .expect("machine");
    let agent = playground
        .add_agent(&AgentSpec::default(), Pose::new(100.0, 100.0, 0.0))
        .expect("agent");

    let grasp = AgentActions {
        grasp: true,
        ..AgentActions::default()
    };
    let mut total_reward = 0.0;
    for _ in 0..5 {
        let events = playground.step(&[(agent, grasp)]);
        total_reward += events
            .rewards
            .iter()
            .find(|(id, _)| *id == agent)
            .map(|(_, r)| *r)
            .expect("reward entry");
    }

    assert!((total_reward - 1.0).abs() < 1e-6, "deposit credits the coin reward");
    assert!(playground.entity(coin).is_none(), "deposited coin is consumed");
    assert!(playground.agent(agent).expect("agent").holding().is_none());
    let machine_entity = playground.entity(machine).expect("machine");
    match &machine_entity.kind {
        playground_core::EntityKind::VendingMachine(state) => assert_eq!(state.deposits, 1),
        other => panic!("unexpected kind {other:?}"),
    }
}

#[test]
fn dispenser_stops_producing_after_limit() {
    let mut playground = Playground::new(seeded_config(5)).expect("playground");
    let area = CoordinateSampler::new(
        Vec2::new(60.0, 60.0),
        AreaShape::Rectangle {
            width: 30.0,
            length: 30.0,
        },
    )
    .expect("area");
    playground
        .add_entity(EntitySpec::dispenser(
            Pose::new(100.0, 100.0, 0.0),
            EntitySpec::apple(Pose::default()),
            area,
            2,
        ))
        .expect("dispenser");
    let agent = playground
        .add_agent(&AgentSpec::default(), Pose::new(112.0, 100.0, 0.0))
        .expect("agent");

    let activate = AgentActions {
        activate: true,
        ..AgentActions::default()
    };
    let mut spawned_total = 0;
    for _ in 0..5 {
        spawned_total += playground.step(&[(agent, activate)]).spawned;
    }
    assert_eq!(spawned_total, 2, "production is capped by the dispenser limit");
    // Dispenser + two produced apples.
    assert_eq!(playground.entity_count(), 3);
}

#[test]
fn trajectory_entity_returns_to_start_after_full_loop() {
    let mut playground = Playground::new(seeded_config(3)).expect("playground");
    let trajectory = Trajectory::from_waypoints(
        40,
        0,
        &[
            Vec2::new(50.0, 50.0),
            Vec2::new(50.0, 150.0),
            Vec2::new(150.0, 150.0),
            Vec2::new(150.0, 50.0),
        ],
    )
    .expect("trajectory");
    let loop_len = trajectory.len();
    let id = playground
        .add_entity(
            EntitySpec::new(
                "distractor",
                trajectory,
                PhysicalShape::Circle { radius: 5.0 },
            )
            .with_mass(1.0),
        )
        .expect("mover");

    let start = playground.entity(id).expect("mover").body.pose();
    for _ in 0..loop_len {
        playground.step(&[]);
    }
    let end = playground.entity(id).expect("mover").body.pose();
    assert_eq!(start, end, "closed path must return to its starting point");
}

#[test]
fn observation_dims_stay_constant_across_scene_changes() {
    let spec = AgentSpec {
        sensors: vec![
            SensorSpec::forward(60.0, std::f32::consts::PI, 32),
            SensorSpec {
                min_range: 4,
                d_r: 8.0,
                ..SensorSpec::forward(40.0, std::f32::consts::FRAC_PI_2, 16)
            },
        ],
        ..AgentSpec::default()
    };
    let mut playground = Playground::new(seeded_config(9)).expect("playground");
    let agent = playground
        .add_agent(&spec, Pose::new(100.0, 100.0, 0.3))
        .expect("agent");

    let empty = SceneRaster::new(64, 64, 3, vec![0.0; 64 * 64 * 3]).expect("raster");
    let busy = SceneRaster::new(64, 64, 3, vec![0.7; 64 * 64 * 3]).expect("raster");

    let observe = |playground: &Playground, raster: &SceneRaster| {
        let mut frames = playground.collect_observations(raster).expect("observations");
        assert_eq!(frames.len(), 1);
        let frame = frames.pop().expect("frame");
        assert_eq!(frame.agent, agent);
        frame
            .observations
            .iter()
            .map(playground_core::Observation::dims)
            .collect::<Vec<_>>()
    };

    let dims_empty = observe(&playground, &empty);
    playground.step(&[(agent, AgentActions::default())]);
    let dims_busy = observe(&playground, &busy);

    assert_eq!(dims_empty, vec![(32, 64, 3), (16, 60, 3)]);
    assert_eq!(dims_empty, dims_busy, "dims never depend on scene content");
}

#[test]
fn impossible_gaussian_area_falls_back_to_center() {
    let mut playground = Playground::new(seeded_config(13)).expect("playground");
    // Practically zero acceptance probability: sampling must still terminate
    // and the entity lands on the area center.
    let sampler = CoordinateSampler::new(
        Vec2::new(80.0, 90.0),
        AreaShape::Gaussian {
            radius: 1e-3,
            variance: 1e12,
        },
    )
    .expect("sampler");
    let id = playground
        .add_entity(EntitySpec::new(
            "obstacle",
            sampler,
            PhysicalShape::Circle { radius: 4.0 },
        ))
        .expect("entity");
    let pose = playground.entity(id).expect("entity").body.pose();
    assert_eq!(pose.position, Vec2::new(80.0, 90.0));
}

#[test]
fn coin_master_style_run_respects_field_caps() {
    let mut playground = Playground::new(PlaygroundConfig {
        time_limit: Some(200),
        ..seeded_config(0xC01)
    })
    .expect("playground");

    playground
        .add_entity(EntitySpec::vending_machine(Pose::new(150.0, 150.0, 0.0)))
        .expect("machine");
    let production_area = CoordinateSampler::new(
        Vec2::new(50.0, 150.0),
        AreaShape::Rectangle {
            width: 80.0,
            length: 80.0,
        },
    )
    .expect("area");
    playground.add_field(Field::new(
        EntitySpec::coin(Pose::default(), 1.0),
        production_area,
        5,
        50,
    ));
    let start_area = CoordinateSampler::new(
        Vec2::new(50.0, 50.0),
        AreaShape::Rectangle {
            width: 80.0,
            length: 80.0,
        },
    )
    .expect("area");
    let agent = playground
        .add_agent(&AgentSpec::default(), start_area)
        .expect("agent");

    let wander = AgentActions {
        longitudinal: 0.8,
        rotation: 0.3,
        grasp: true,
        ..AgentActions::default()
    };
    let mut last_done = false;
    for _ in 0..200 {
        let events = playground.step(&[(agent, wander)]);
        let field = &playground.fields()[0];
        assert!(field.alive_count() <= 5, "alive cap exceeded");
        assert!(field.produced_total() <= 50, "lifetime cap exceeded");
        let pose = playground.agent(agent).expect("agent").body.pose();
        assert!((0.0..=200.0).contains(&pose.position.x));
        assert!((0.0..=200.0).contains(&pose.position.y));
        last_done = events.done;
    }
    assert!(last_done, "time limit must signal termination");
    assert_eq!(playground.tick(), Tick(200));
}
