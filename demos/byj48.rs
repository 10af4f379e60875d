//! Example: driving a 28BYJ-48 geared motor on the simulated backend.
//!
//! This example demonstrates how to:
//! - Start an engine for a unipolar driver
//! - Mix step, degree and continuous moves
//! - Switch from half to full steps in sync with the coil sequence
//!
//! Run with: `cargo run --example byj48`

use std::thread;
use std::time::Duration;

use stepper_engine::driver::{Coil, UnipolarDriver};
use stepper_engine::waveform::SimulatedWaveform;
use stepper_engine::{Direction, Result, Stepper};

/// Mock coil output for demonstration.
struct MockCoil;

impl embedded_hal::digital::ErrorType for MockCoil {
    type Error = core::convert::Infallible;
}

impl embedded_hal::digital::OutputPin for MockCoil {
    fn set_low(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> core::result::Result<(), Self::Error> {
        Ok(())
    }
}

fn main() -> Result<()> {
    println!("=== 28BYJ-48 Example ===\n");

    let driver = UnipolarDriver::byj48(
        Coil::new(17, MockCoil),
        Coil::new(18, MockCoil),
        Coil::new(27, MockCoil),
        Coil::new(22, MockCoil),
    );

    // play the waveforms ten times faster than real time, recording nothing
    let stepper = Stepper::builder()
        .driver(driver)
        .backend(SimulatedWaveform::with_time_scale(0.1).with_log_capacity(0))
        .build()?;

    println!("Driver: {}", stepper.parameters().name);
    println!("Microsteps: {}", stepper.microsteps()?.value());

    stepper.move_by(1024, Some(600.0), true)?;
    println!("After 1024 half steps: {}", stepper.current_position()?);

    stepper.move_to_deg(-90.0, true)?;
    println!("At -90 degrees: {}", stepper.current_position()?);

    stepper.run(Direction::Clockwise, Some(400.0))?;
    thread::sleep(Duration::from_millis(200));
    println!(
        "Running at {:.0} steps/s, position {}",
        stepper.current_speed()?,
        stepper.current_position()?
    );
    stepper.stop(true)?;
    println!("Stopped at {}", stepper.current_position()?);

    // from an odd half-step position the switch waits for the next step
    let change = stepper.set_microsteps(1)?;
    println!("Switch to full steps: {:?}", change);
    stepper.move_by(100, None, true)?;
    println!(
        "After 100 more steps: {} at microsteps {}",
        stepper.current_position()?,
        stepper.microsteps()?.value()
    );

    stepper.release(true)?;
    stepper.close()?;

    println!("\n=== Example Complete ===");
    Ok(())
}
