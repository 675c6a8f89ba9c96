//! Subcommand bodies.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use eol_config::Config;
use eol_core::{
    EmergencyStopController, HardwareOrchestrator, InMemoryRepository, TestCommand,
    TestExecutionEngine, TestResult, TestStatus,
};
use eol_traits::{Device, DeviceStatus};
use eyre::WrapErr;

use crate::cli::{Commands, json_mode};
use crate::error_fmt::{EXIT_ERROR, EXIT_PASS, describe, exit_code_for_result};
use crate::rig;

pub async fn dispatch(cmd: Commands, cfg: Config) -> eyre::Result<i32> {
    let orchestrator = Arc::new(rig::build(&cfg.hardware)?);
    match cmd {
        Commands::Run {
            profile,
            dut,
            operator,
        } => run(orchestrator, &cfg, TestCommand::new(profile, dut, operator)).await,
        Commands::SelfCheck => self_check(&orchestrator).await,
        Commands::Health => health(orchestrator, &cfg).await,
        Commands::Estop { axis } => estop(&orchestrator, axis).await,
    }
}

/// What a Ctrl-C does, by how many have arrived during the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    Cancel,
    EmergencyStop,
}

const fn interrupt_action(count: usize) -> Interrupt {
    if count <= 1 {
        Interrupt::Cancel
    } else {
        Interrupt::EmergencyStop
    }
}

async fn run(
    orchestrator: Arc<HardwareOrchestrator>,
    cfg: &Config,
    cmd: TestCommand,
) -> eyre::Result<i32> {
    let estop = Arc::new(EmergencyStopController::new(&orchestrator));
    let engine = TestExecutionEngine::new(
        orchestrator,
        Arc::new(cfg.profile_dir()),
        Arc::new(InMemoryRepository::new()),
    )
    .with_emergency_stop(&estop);

    // First Ctrl-C cancels and parks the robot; a second one stops it where
    // it stands.
    let cancel = engine.cancel_handle();
    let runtime = tokio::runtime::Handle::current();
    let interrupts = AtomicUsize::new(0);
    ctrlc::set_handler(move || {
        match interrupt_action(interrupts.fetch_add(1, Ordering::SeqCst) + 1) {
            Interrupt::Cancel => {
                tracing::warn!("interrupt received; cancelling test (again for emergency stop)");
                cancel.cancel();
            }
            Interrupt::EmergencyStop => {
                tracing::error!("second interrupt; emergency stop");
                let estop = estop.clone();
                runtime.spawn(async move {
                    estop.execute_emergency_stop().await;
                });
            }
        }
    })
    .wrap_err("install Ctrl-C handler")?;

    tracing::info!(profile = %cmd.profile, dut = %cmd.dut, "starting test");
    let result = engine.execute(cmd).await;
    print_result(&result)?;
    Ok(exit_code_for_result(&result))
}

fn print_result(result: &TestResult) -> eyre::Result<()> {
    if json_mode() {
        println!("{}", serde_json::to_string(result)?);
        return Ok(());
    }

    let id = result
        .test_id
        .map_or_else(|| "-".to_string(), |id| id.to_string());
    let verdict = match result.status {
        TestStatus::Completed if result.is_passed => "PASS",
        TestStatus::Failed => "FAIL",
        _ => "NOT EVALUATED",
    };
    println!(
        "test {id}: {:?} ({verdict}) in {} ms, {} measurements",
        result.status,
        result.duration_ms,
        result.measurements.len()
    );
    for v in &result.violations {
        println!("  out of bounds: {v}");
    }
    if let Some(e) = &result.energy {
        println!(
            "  energy: {:.3} Wh, {:.3} Ah over {:.1} s",
            e.watt_hours, e.amp_hours, e.seconds
        );
    }
    if result.status == TestStatus::Error
        && let (Some(category), Some(message)) = (result.error_category, &result.error_message)
    {
        eprintln!("{}", describe(category, message));
    }
    Ok(())
}

async fn self_check(orchestrator: &HardwareOrchestrator) -> eyre::Result<i32> {
    let connected = orchestrator.connect_all().await;
    let h = orchestrator.handles();
    let mut devices: Vec<(&'static str, Option<DeviceStatus>)> = vec![
        (h.robot.name(), h.robot.status().await.ok()),
        (h.mcu.name(), h.mcu.status().await.ok()),
        (h.loadcell.name(), h.loadcell.status().await.ok()),
        (h.power.name(), h.power.status().await.ok()),
        (h.digital_io.name(), h.digital_io.status().await.ok()),
    ];
    if let Some(a) = &h.power_analyzer {
        devices.push((a.name(), a.status().await.ok()));
    }
    orchestrator.disconnect_all().await;

    let code = match &connected {
        Ok(()) => EXIT_PASS,
        Err(e) => {
            tracing::error!(error = %e, "self-check failed");
            EXIT_ERROR
        }
    };
    if json_mode() {
        let map: serde_json::Map<String, serde_json::Value> = devices
            .iter()
            .map(|(name, status)| ((*name).to_string(), serde_json::json!(status)))
            .collect();
        println!(
            "{}",
            serde_json::json!({
                "ok": connected.is_ok(),
                "error": connected.as_ref().err().map(ToString::to_string),
                "devices": map,
            })
        );
    } else {
        for (name, status) in &devices {
            match status {
                Some(s) => println!("{name}: ok {s:?}"),
                None => println!("{name}: no answer"),
            }
        }
        match &connected {
            Ok(()) => println!("self-check ok"),
            Err(e) => println!("self-check failed: {e}"),
        }
    }
    Ok(code)
}

async fn health(orchestrator: Arc<HardwareOrchestrator>, cfg: &Config) -> eyre::Result<i32> {
    if let Err(e) = orchestrator.connect_all().await {
        tracing::warn!(error = %e, "not every device answered");
    }
    let engine = TestExecutionEngine::new(
        orchestrator.clone(),
        Arc::new(cfg.profile_dir()),
        Arc::new(InMemoryRepository::new()),
    );
    let status = engine.status();
    orchestrator.disconnect_all().await;

    if json_mode() {
        println!("{}", serde_json::to_string(&status)?);
    } else {
        println!(
            "running: {}, emergency stop: {}",
            status.running, status.emergency_stop
        );
        for (name, connected) in &status.hardware {
            println!("{name}: {}", if *connected { "connected" } else { "offline" });
        }
    }
    Ok(EXIT_PASS)
}

async fn estop(orchestrator: &HardwareOrchestrator, axis: u8) -> eyre::Result<i32> {
    if let Err(e) = orchestrator.connect_all().await {
        tracing::warn!(error = %e, "stopping with the devices that connected");
    }
    let controller = EmergencyStopController::new(orchestrator).with_axis(axis);
    let report = controller.execute_emergency_stop().await;
    orchestrator.disconnect_all().await;

    if json_mode() {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(
            "robot stopped: {}, power disabled: {}",
            report.robot_stopped, report.power_disabled
        );
    }
    Ok(if report.robot_stopped && report.power_disabled {
        EXIT_PASS
    } else {
        EXIT_ERROR
    })
}
