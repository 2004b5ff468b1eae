// 50 Hz base loop with watchdog, plus the trajectory coordinator's zenoh wiring
//
// Base: twist commands are held only while fresh; if teleop stops sending,
// the watchdog zeroes the wheels. Displacement commands run for their own
// planned duration and are not subject to the watchdog.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::interval;
use tracing::{debug, info, warn};

use crate::base::{self, velocity_to_wheel};
use crate::config::{
    CMD_TIMEOUT, LOOP_HZ, RobotConfig, TOPIC_CMD_ANGLES, TOPIC_CMD_MOVE, TOPIC_CMD_VEL,
    TOPIC_HEALTH, TOPIC_JOINT_STATES, TOPIC_ODOM, TOPIC_RT_WHEELS,
};
use crate::messages::{
    AngleVectorCommand, BaseMove, BasePose, BaseTwist, JointStateMsg, RuntimeHealth, WheelCommand,
};
use crate::trajectory::{
    ChannelOptions, GoalStart, MultiChannelCoordinator, Target, ZenohEndpointFactory,
};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

fn tick_period() -> Duration {
    Duration::from_millis(1000 / LOOP_HZ)
}

pub struct Runtime {
    latest_twist: Option<BaseTwist>,
    twist_received_at: Instant,
    // Planned displacement and when it ends
    active_move: Option<(WheelCommand, Instant)>,
    health: RuntimeHealth,
    pose: BasePose,
}

impl Runtime {
    pub fn new(now: Instant) -> Self {
        Self {
            latest_twist: None,
            twist_received_at: now,
            active_move: None,
            health: RuntimeHealth::CmdStale, // Start stale until first cmd
            pose: BasePose::default(),
        }
    }

    pub fn health(&self) -> RuntimeHealth {
        self.health
    }

    pub fn pose(&self) -> BasePose {
        self.pose
    }

    /// A twist supersedes any displacement in progress
    pub fn on_twist(&mut self, twist: BaseTwist, now: Instant) {
        debug!("Received twist: {:?}", &twist);
        if self.active_move.take().is_some() {
            info!("Twist received, dropping displacement in progress");
        }
        self.latest_twist = Some(twist);
        self.twist_received_at = now;
    }

    /// A displacement supersedes the current twist
    pub fn on_move(&mut self, cmd: BaseMove, now: Instant) {
        info!("Received move: {:?}", &cmd);
        let Some(plan) = base::plan_motion(cmd.x, cmd.y, cmd.theta) else {
            debug!("Zero displacement, ignoring");
            return;
        };
        let end = now + Duration::try_from_secs_f32(plan.duration).unwrap_or(Duration::ZERO);
        self.latest_twist = None;
        self.active_move = Some((plan, end));
    }

    /// Wheel command for the tick starting at `now` (includes watchdog logic)
    pub fn compute_actuation(&mut self, now: Instant) -> WheelCommand {
        let tick = tick_period().as_secs_f32();

        if let Some((plan, end)) = self.active_move {
            if now < end {
                self.health = RuntimeHealth::Moving;
                return WheelCommand::new(plan.velocities, tick);
            }
            info!("Displacement finished");
            self.active_move = None;
        }

        let cmd_age = now.saturating_duration_since(self.twist_received_at);
        match self.latest_twist {
            Some(ref twist) if cmd_age <= CMD_TIMEOUT => {
                self.health = RuntimeHealth::Ok;
                velocity_to_wheel(twist).to_command(tick)
            }
            Some(_) => {
                // Watchdog triggered - stop the robot
                if self.health != RuntimeHealth::CmdStale {
                    warn!("Command stale ({:?} old), stopping robot", cmd_age);
                }
                self.health = RuntimeHealth::CmdStale;
                WheelCommand::stopped()
            }
            None => {
                // No command ever received
                self.health = RuntimeHealth::CmdStale;
                WheelCommand::stopped()
            }
        }
    }

    /// Dead-reckon the wheels being held for `dt`
    pub fn update_odometry(&mut self, cmd: &WheelCommand, dt: Duration) {
        if cmd.is_stopped() {
            return;
        }
        let delta = base::odometry_delta(&cmd.velocities, dt.as_secs_f32());
        self.pose = base::integrate(&self.pose, &delta);
    }
}

/// Channels addressed by an angle command: none means all, one name may be a group
pub fn command_target(cmd: &AngleVectorCommand) -> Target {
    match cmd.target.as_deref() {
        None | Some([]) => Target::All,
        Some([name]) => Target::Named(name.clone()),
        Some(names) => Target::Channels(names.to_vec()),
    }
}

async fn spawn_trajectory_tasks(
    session: &zenoh::Session,
    coordinator: Arc<MultiChannelCoordinator<ZenohEndpointFactory>>,
    config: RobotConfig,
) -> Result<(), BoxError> {
    let sub_joint_states = session.declare_subscriber(TOPIC_JOINT_STATES).await?;
    let sub_angles = session.declare_subscriber(TOPIC_CMD_ANGLES).await?;

    // 1. Register controllers in the background; commands only reach channels already up
    tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move {
            let registered = coordinator.configure(&config).await;
            info!(
                "{} of {} trajectory channels registered, joint list {:?}",
                registered,
                config.controllers.len(),
                coordinator.joint_list()
            );
        }
    });

    // 2. Whole-body joint states
    tokio::spawn({
        let coordinator = Arc::clone(&coordinator);
        async move {
            while let Ok(sample) = sub_joint_states.recv_async().await {
                let payload = sample.payload().to_bytes();
                match serde_json::from_slice::<JointStateMsg>(&payload) {
                    Ok(msg) => coordinator.apply_joint_state(&msg),
                    Err(e) => warn!("Failed to parse joint state: {}", e),
                }
            }
        }
    });

    // 3. Whole-robot angle commands
    tokio::spawn(async move {
        while let Ok(sample) = sub_angles.recv_async().await {
            let payload = sample.payload().to_bytes();
            let cmd = match serde_json::from_slice::<AngleVectorCommand>(&payload) {
                Ok(cmd) => cmd,
                Err(e) => {
                    warn!("Failed to parse angle command: {}", e);
                    continue;
                }
            };
            let duration = match Duration::try_from_secs_f64(cmd.duration) {
                Ok(d) => d,
                Err(e) => {
                    warn!("Invalid angle command duration {}: {}", cmd.duration, e);
                    continue;
                }
            };
            let target = command_target(&cmd);
            match coordinator.send_angle_vector(&cmd.positions, duration, &target, GoalStart::Now) {
                Ok(sent) => debug!("Angle command sent to {} channels", sent),
                Err(e) => warn!("Angle command rejected: {}", e),
            }
        }
    });

    Ok(())
}

pub async fn run(config: Option<RobotConfig>) -> Result<(), BoxError> {
    let config = config.unwrap_or_default();
    let options = ChannelOptions {
        goal_time_tolerance: config.goal_time_tolerance()?,
        start_offset: config.start_offset()?,
    };
    let connect_timeout = config.connect_timeout()?;

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;

    let coordinator = Arc::new(
        MultiChannelCoordinator::new(ZenohEndpointFactory::new(session.clone()))
            .with_options(options, connect_timeout),
    );
    spawn_trajectory_tasks(&session, Arc::clone(&coordinator), config).await?;

    info!("Setting up publishers and subscribers...");
    let sub_vel = session.declare_subscriber(TOPIC_CMD_VEL).await?;
    let sub_move = session.declare_subscriber(TOPIC_CMD_MOVE).await?;
    let pub_wheels = session.declare_publisher(TOPIC_RT_WHEELS).await?;
    let pub_health = session.declare_publisher(TOPIC_HEALTH).await?;
    let pub_odom = session.declare_publisher(TOPIC_ODOM).await?;

    let mut runtime = Runtime::new(Instant::now());
    let mut tick = interval(tick_period());

    info!(
        "Runtime started: {}Hz loop, {}ms watchdog timeout",
        LOOP_HZ,
        CMD_TIMEOUT.as_millis()
    );
    info!(
        "Subscribed to: {}, {}, {}, {}",
        TOPIC_CMD_VEL, TOPIC_CMD_MOVE, TOPIC_CMD_ANGLES, TOPIC_JOINT_STATES
    );
    info!(
        "Publishing to: {}, {}, {}",
        TOPIC_RT_WHEELS, TOPIC_HEALTH, TOPIC_ODOM
    );

    loop {
        tick.tick().await;
        let now = Instant::now();

        // 1. Drain all pending commands (non-blocking), keep latest
        while let Ok(Some(sample)) = sub_vel.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<BaseTwist>(&payload) {
                Ok(twist) => runtime.on_twist(twist, now),
                Err(e) => warn!("Failed to parse twist: {}", e),
            }
        }
        while let Ok(Some(sample)) = sub_move.try_recv() {
            let payload = sample.payload().to_bytes();
            match serde_json::from_slice::<BaseMove>(&payload) {
                Ok(cmd) => runtime.on_move(cmd, now),
                Err(e) => warn!("Failed to parse move: {}", e),
            }
        }

        // 2. Compute actuation (includes watchdog logic)
        let actuation = runtime.compute_actuation(now);
        runtime.update_odometry(&actuation, tick_period());

        // 3. Publish actuation
        let actuation_json = serde_json::to_string(&actuation)?;
        pub_wheels.put(actuation_json).await?;

        // 4. Publish health and pose
        let health_json = serde_json::to_string(&runtime.health())?;
        pub_health.put(health_json).await?;
        let odom_json = serde_json::to_string(&runtime.pose())?;
        pub_odom.put(odom_json).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn twist(x_vel: f32, y_vel: f32, theta_vel: f32) -> BaseTwist {
        BaseTwist {
            x_vel,
            y_vel,
            theta_vel,
        }
    }

    #[test]
    fn test_stale_until_first_command() {
        let t0 = Instant::now();
        let mut runtime = Runtime::new(t0);
        assert!(runtime.compute_actuation(t0).is_stopped());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_watchdog_stops_stale_twist() {
        let t0 = Instant::now();
        let mut runtime = Runtime::new(t0);
        runtime.on_twist(twist(0.2, 0.0, 0.0), t0);

        let fresh = runtime.compute_actuation(t0 + Duration::from_millis(100));
        assert!(!fresh.is_stopped());
        assert_eq!(runtime.health(), RuntimeHealth::Ok);

        let stale = runtime.compute_actuation(t0 + CMD_TIMEOUT + Duration::from_millis(1));
        assert!(stale.is_stopped());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_move_runs_for_planned_duration() {
        let t0 = Instant::now();
        let mut runtime = Runtime::new(t0);
        let plan = base::translate(0.5, 0.0);
        runtime.on_move(BaseMove { x: 0.5, y: 0.0, theta: 0.0 }, t0);

        // Well past the twist watchdog, still moving
        let during = runtime.compute_actuation(t0 + Duration::from_millis(400));
        assert_eq!(runtime.health(), RuntimeHealth::Moving);
        assert_eq!(during.velocities, plan.velocities);

        let end = Duration::from_secs_f32(plan.duration);
        let after = runtime.compute_actuation(t0 + end + Duration::from_millis(1));
        assert!(after.is_stopped());
        assert_eq!(runtime.health(), RuntimeHealth::CmdStale);
    }

    #[test]
    fn test_twist_supersedes_move() {
        let t0 = Instant::now();
        let mut runtime = Runtime::new(t0);
        runtime.on_move(BaseMove { x: 1.0, y: 0.0, theta: 0.0 }, t0);
        runtime.on_twist(twist(0.0, 0.0, 0.0), t0);

        let cmd = runtime.compute_actuation(t0);
        assert!(cmd.is_stopped());
        assert_eq!(runtime.health(), RuntimeHealth::Ok);
    }

    #[test]
    fn test_zero_move_is_ignored() {
        let t0 = Instant::now();
        let mut runtime = Runtime::new(t0);
        runtime.on_twist(twist(0.2, 0.0, 0.0), t0);
        runtime.on_move(BaseMove::default(), t0);
        assert!(!runtime.compute_actuation(t0).is_stopped());
    }

    #[test]
    fn test_odometry_accumulates_forward_move() {
        let t0 = Instant::now();
        let mut runtime = Runtime::new(t0);
        let plan = base::translate(0.3, 0.0);
        runtime.on_move(BaseMove { x: 0.3, y: 0.0, theta: 0.0 }, t0);

        // Integrate over the whole plan in one step
        let cmd = runtime.compute_actuation(t0);
        runtime.update_odometry(&cmd, Duration::from_secs_f32(plan.duration));
        let pose = runtime.pose();
        assert!((pose.x - 0.3).abs() < 1e-3, "{:?}", pose);
        assert!(pose.y.abs() < 1e-3);
        assert!(pose.theta.abs() < 1e-3);

        runtime.update_odometry(&WheelCommand::stopped(), Duration::from_secs(1));
        assert_eq!(runtime.pose(), pose);
    }

    #[test]
    fn test_command_target() {
        let mut cmd = AngleVectorCommand {
            positions: vec![0.0],
            duration: 1.0,
            target: None,
        };
        assert_eq!(command_target(&cmd), Target::All);

        cmd.target = Some(vec!["upper".into()]);
        assert_eq!(command_target(&cmd), Target::Named("upper".into()));

        cmd.target = Some(vec!["arm".into(), "head".into()]);
        assert_eq!(
            command_target(&cmd),
            Target::Channels(vec!["arm".into(), "head".into()])
        );
    }
}
