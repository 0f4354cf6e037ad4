use std::sync::Arc;

use crate::error::AngleError;

/// Supplies the angle assigned to each captured frame. One value is taken
/// per successful tick. The capture loop borrows its stage context across
/// awaits, so sources must be `Sync` as well.
pub trait AngleSource: Send + Sync {
    fn next_angle(&mut self) -> Result<u16, AngleError>;
}

/// Builds a fresh angle source at the start of every stage.
pub type AngleSourceFactory = Arc<dyn Fn() -> Box<dyn AngleSource> + Send + Sync>;

/// Derives the angle from the number of frames taken so far in the stage,
/// assuming the user rotates the model at a steady pace.
#[derive(Debug, Clone)]
pub struct TickAngleSource {
    step_degrees: u16,
    frame_count: u32,
}

impl TickAngleSource {
    pub fn new(step_degrees: u16) -> Self {
        Self {
            step_degrees,
            frame_count: 0,
        }
    }

    pub fn factory(step_degrees: u16) -> AngleSourceFactory {
        Arc::new(move || Box::new(TickAngleSource::new(step_degrees)) as Box<dyn AngleSource>)
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }
}

impl AngleSource for TickAngleSource {
    fn next_angle(&mut self) -> Result<u16, AngleError> {
        let angle = (u64::from(self.frame_count) * u64::from(self.step_degrees)) % 360;
        self.frame_count = self.frame_count.wrapping_add(1);
        Ok(angle as u16)
    }
}

/// Heading provider for devices that expose a real orientation.
pub trait OrientationSensor: Send + Sync {
    /// Rotation of the camera around the model, in degrees. Any real value is
    /// accepted and normalized.
    fn heading_degrees(&self) -> Result<f64, AngleError>;
}

pub struct SensorAngleSource<S> {
    sensor: Arc<S>,
}

impl<S: OrientationSensor + 'static> SensorAngleSource<S> {
    pub fn new(sensor: Arc<S>) -> Self {
        Self { sensor }
    }

    pub fn factory(sensor: Arc<S>) -> AngleSourceFactory {
        Arc::new(move || {
            Box::new(SensorAngleSource::new(Arc::clone(&sensor))) as Box<dyn AngleSource>
        })
    }
}

impl<S: OrientationSensor> AngleSource for SensorAngleSource<S> {
    fn next_angle(&mut self) -> Result<u16, AngleError> {
        let heading = self.sensor.heading_degrees()?;
        if !heading.is_finite() {
            return Err(AngleError::NonFiniteHeading);
        }
        // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
        let normalized = heading.rem_euclid(360.0).floor() as u16;
        Ok(normalized % 360)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct ScriptedSensor {
        headings: Mutex<Vec<f64>>,
    }

    impl OrientationSensor for ScriptedSensor {
        fn heading_degrees(&self) -> Result<f64, AngleError> {
            self.headings
                .lock()
                .unwrap()
                .pop()
                .ok_or_else(|| AngleError::SensorUnavailable("script exhausted".into()))
        }
    }

    #[test]
    fn tick_source_walks_a_full_rotation() {
        let mut source = TickAngleSource::new(15);
        let angles: Vec<u16> = (0..26).map(|_| source.next_angle().unwrap()).collect();
        assert_eq!(angles[0], 0);
        assert_eq!(angles[1], 15);
        assert_eq!(angles[23], 345);
        assert_eq!(angles[24], 0);
        assert_eq!(angles[25], 15);
        assert_eq!(source.frame_count(), 26);
    }

    #[test]
    fn factory_restarts_each_stage_at_zero() {
        let factory = TickAngleSource::factory(15);
        let mut first = factory();
        first.next_angle().unwrap();
        first.next_angle().unwrap();
        let mut second = factory();
        assert_eq!(second.next_angle().unwrap(), 0);
    }

    #[test]
    fn sensor_headings_are_normalized_and_floored() {
        // popped from the back
        let sensor = Arc::new(ScriptedSensor {
            headings: Mutex::new(vec![-1e-20, 719.9, -30.5, 14.99]),
        });
        let mut source = SensorAngleSource::new(sensor);
        assert_eq!(source.next_angle().unwrap(), 14);
        assert_eq!(source.next_angle().unwrap(), 329);
        assert_eq!(source.next_angle().unwrap(), 359);
        assert_eq!(source.next_angle().unwrap(), 0);
        assert!(source.next_angle().is_err());
    }

    #[test]
    fn non_finite_heading_is_rejected() {
        let sensor = Arc::new(ScriptedSensor {
            headings: Mutex::new(vec![f64::NAN]),
        });
        let mut source = SensorAngleSource::new(sensor);
        assert!(matches!(
            source.next_angle(),
            Err(AngleError::NonFiniteHeading)
        ));
    }
}
