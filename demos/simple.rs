use core::time::Duration;
use euler_ekf::{EngineConfig, OrientationEngine};
use nalgebra::Vector3;

fn main() {
    let period = Duration::from_millis(10);
    let mut engine: OrientationEngine = OrientationEngine::new(EngineConfig::default()).unwrap();

    // Sensor data: a level device with a small gyro offset, still for two
    // seconds and then turning left at 0.5 rad/s for one second
    let offset = Vector3::new(0.01, -0.005, 0.002);
    let acc = Vector3::new(0.0, 0.0, 9.81);
    let mag = Vector3::new(0.0, 22.0, -40.0);

    let mut timestamp = Duration::ZERO;
    for step in 0..300 {
        let gyr = if step < 200 {
            offset
        } else {
            offset + Vector3::new(0.0, 0.0, 0.5)
        };

        engine.on_gyro(timestamp, gyr);
        engine.on_accel(acc);
        engine.on_mag(mag);
        timestamp += period;
    }

    let attitude = engine.attitude().to_degrees();
    let bias = engine.gyro_bias();

    println!(
        "Attitude:   roll {:.2}, pitch {:.2}, yaw {:.2} deg",
        attitude.roll, attitude.pitch, attitude.yaw
    );
    println!("Integrated: {:?}", engine.integrated_angles());
    println!("Gyro bias:  {:?}", bias);
    println!("Stationary: {}", engine.is_stationary());
}
