// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use comms_if::eqpt::{drive::DriveCommand, perception::Bearing};
use log::{debug, warn};
use rppal::{
    gpio::{Gpio, OutputPin},
    pwm::{Channel, Polarity, Pwm},
};

use super::{DriveActuator, DriveError, DriveParams};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// One half of the H-bridge.
struct Motor {
    enable: Pwm,
    fwd: OutputPin,
    rev: OutputPin,
    inverted: bool,
}

pub struct L298nDrive {
    left: Motor,
    right: Motor,
    disabled: bool,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl Motor {
    fn new(
        gpio: &Gpio,
        channel: Channel,
        fwd_pin: u8,
        rev_pin: u8,
        inverted: bool,
        frequency_hz: f64,
    ) -> Result<Self, DriveError> {
        let enable = Pwm::with_frequency(channel, frequency_hz, 0.0, Polarity::Normal, true)
            .map_err(DriveError::Pwm)?;

        let mut fwd = gpio.get(fwd_pin).map_err(DriveError::Gpio)?.into_output();
        let mut rev = gpio.get(rev_pin).map_err(DriveError::Gpio)?.into_output();
        fwd.set_low();
        rev.set_low();

        Ok(Self {
            enable,
            fwd,
            rev,
            inverted,
        })
    }

    /// Set a normalised (-1 to +1) demand.
    fn set(&mut self, demand: f64) -> Result<(), DriveError> {
        let demand = if self.inverted { -demand } else { demand };

        if demand > 0.0 {
            self.rev.set_low();
            self.fwd.set_high();
        }
        else if demand < 0.0 {
            self.fwd.set_low();
            self.rev.set_high();
        }
        else {
            self.fwd.set_low();
            self.rev.set_low();
        }

        self.enable
            .set_duty_cycle(demand.abs().min(1.0))
            .map_err(DriveError::Pwm)
    }

    fn coast(&mut self) -> Result<(), DriveError> {
        self.fwd.set_low();
        self.rev.set_low();
        self.enable.set_duty_cycle(0.0).map_err(DriveError::Pwm)
    }
}

impl L298nDrive {
    pub fn new(params: &DriveParams) -> Result<Self, DriveError> {
        let gpio = Gpio::new().map_err(DriveError::Gpio)?;

        let left = Motor::new(
            &gpio,
            Channel::Pwm0,
            params.left_fwd_pin,
            params.left_rev_pin,
            params.invert_left,
            params.pwm_frequency_hz,
        )?;
        let right = Motor::new(
            &gpio,
            Channel::Pwm1,
            params.right_fwd_pin,
            params.right_rev_pin,
            params.invert_right,
            params.pwm_frequency_hz,
        )?;

        debug!("L298N drive initialised");

        Ok(Self {
            left,
            right,
            disabled: false,
        })
    }

    fn apply(&mut self, cmd: DriveCommand) -> Result<(), DriveError> {
        if self.disabled {
            return Err(DriveError::Disabled);
        }

        let (l, r) = cmd.wheel_demands();
        self.left.set(l)?;
        self.right.set(r)
    }
}

impl DriveActuator for L298nDrive {
    fn forward(&mut self, speed: f64, bias: f64, toward: Bearing) -> Result<(), DriveError> {
        self.apply(DriveCommand::Forward {
            speed,
            bias,
            toward,
        })
    }

    fn backward(&mut self, speed: f64, bias: f64, toward: Bearing) -> Result<(), DriveError> {
        self.apply(DriveCommand::Backward {
            speed,
            bias,
            toward,
        })
    }

    fn pivot_left(&mut self, speed: f64) -> Result<(), DriveError> {
        self.apply(DriveCommand::PivotLeft { speed })
    }

    fn pivot_right(&mut self, speed: f64) -> Result<(), DriveError> {
        self.apply(DriveCommand::PivotRight { speed })
    }

    fn stop(&mut self) -> Result<(), DriveError> {
        // Attempt both sides even if the first fails
        let l = self.left.coast();
        let r = self.right.coast();
        l.and(r)
    }

    fn disable(&mut self) -> Result<(), DriveError> {
        self.stop()?;

        if !self.disabled {
            self.left.enable.disable().map_err(DriveError::Pwm)?;
            self.right.enable.disable().map_err(DriveError::Pwm)?;
            self.disabled = true;
            debug!("L298N drive disabled");
        }

        Ok(())
    }
}

impl Drop for L298nDrive {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            warn!("Could not disable the drive on drop: {}", e);
        }
    }
}
