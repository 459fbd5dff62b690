//! ESP-IDF implementations of the hardware seams.
//!
//! Pins are addressed by number at runtime, so this goes through the IDF
//! driver calls in `esp_idf_svc::sys` rather than the typed `PinDriver`s.
//!
//! # Interrupts
//!
//! One shared GPIO ISR service, one handler per pin. The handler argument is
//! a pointer to the pin's boxed [`InterruptProducer`], which stays in
//! `EspGpio::handlers` until `gpio_isr_handler_remove` has returned.

use core::ffi::c_void;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use esp_idf_hal::delay::FreeRtos;
use esp_idf_svc::sys::{self, esp, EspError};

use super::{Clock, GpioPort, HalError};
use crate::capture::InterruptProducer;
use crate::pin::{InterruptEdge, PinMode};

/// ADC1 one-shot unit handle.
struct AdcUnit(sys::adc_oneshot_unit_handle_t);

// SAFETY: the handle is only used under `EspGpio::adc`'s mutex.
unsafe impl Send for AdcUnit {}

#[derive(Default)]
struct AdcState {
    unit: Option<AdcUnit>,
    channels: HashMap<u8, sys::adc_channel_t>,
}

/// GPIO port over the ESP-IDF driver.
pub struct EspGpio {
    handlers: Mutex<HashMap<u8, Box<InterruptProducer>>>,
    adc: Mutex<AdcState>,
}

impl EspGpio {
    /// Install the shared GPIO ISR service.
    pub fn new() -> Result<Self, HalError> {
        // SAFETY: plain driver call; INVALID_STATE means already installed
        let err = unsafe { sys::gpio_install_isr_service(0) };
        if err != sys::ESP_ERR_INVALID_STATE as sys::esp_err_t {
            esp!(err)?;
        }
        Ok(Self {
            handlers: Mutex::new(HashMap::new()),
            adc: Mutex::new(AdcState::default()),
        })
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<u8, Box<InterruptProducer>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(pin: u8) -> Result<sys::gpio_num_t, HalError> {
        if (pin as sys::gpio_num_t) < sys::gpio_num_t_GPIO_NUM_MAX {
            Ok(pin as sys::gpio_num_t)
        } else {
            Err(HalError::InvalidPin(pin))
        }
    }

    fn input(pin: sys::gpio_num_t, pull: sys::gpio_pull_mode_t) -> Result<(), EspError> {
        // SAFETY: pin number checked against GPIO_NUM_MAX
        unsafe {
            esp!(sys::gpio_set_direction(pin, sys::gpio_mode_t_GPIO_MODE_INPUT))?;
            esp!(sys::gpio_set_pull_mode(pin, pull))
        }
    }

    fn configure_adc(&self, pin: u8) -> Result<(), HalError> {
        let mut unit_id: sys::adc_unit_t = 0;
        let mut channel: sys::adc_channel_t = 0;
        // SAFETY: out-pointers are valid locals
        esp!(unsafe { sys::adc_oneshot_io_to_channel(pin as i32, &mut unit_id, &mut channel) })
            .map_err(|_| HalError::InvalidPin(pin))?;

        // ADC2 is shared with Wi-Fi
        if unit_id != sys::adc_unit_t_ADC_UNIT_1 {
            return Err(HalError::InvalidPin(pin));
        }

        let mut adc = self.adc.lock().unwrap_or_else(PoisonError::into_inner);
        let handle = match &adc.unit {
            Some(unit) => unit.0,
            None => {
                let init = sys::adc_oneshot_unit_init_cfg_t {
                    unit_id,
                    ..Default::default()
                };
                let mut handle: sys::adc_oneshot_unit_handle_t = core::ptr::null_mut();
                // SAFETY: init config and out-pointer are valid locals
                esp!(unsafe { sys::adc_oneshot_new_unit(&init, &mut handle) })?;
                adc.unit = Some(AdcUnit(handle));
                handle
            }
        };

        let chan_cfg = sys::adc_oneshot_chan_cfg_t {
            atten: sys::adc_atten_t_ADC_ATTEN_DB_11,
            bitwidth: sys::adc_bitwidth_t_ADC_BITWIDTH_DEFAULT,
        };
        // SAFETY: handle created above and never freed
        esp!(unsafe { sys::adc_oneshot_config_channel(handle, channel, &chan_cfg) })?;
        adc.channels.insert(pin, channel);
        Ok(())
    }
}

/// GPIO ISR handler. `arg` is the pin's `InterruptProducer`.
unsafe extern "C" fn on_edge(arg: *mut c_void) {
    // SAFETY: arg points into a Box kept alive until the handler is removed
    let producer = unsafe { &*(arg as *const InterruptProducer) };
    let high = unsafe { sys::gpio_get_level(producer.pin() as sys::gpio_num_t) } != 0;
    producer.capture(high);
}

impl GpioPort for EspGpio {
    fn apply_mode(&self, pin: u8, mode: PinMode) -> Result<(), HalError> {
        let num = Self::check(pin)?;
        // SAFETY: pin number checked
        esp!(unsafe { sys::gpio_reset_pin(num) })?;

        match mode {
            PinMode::Output => {
                // INPUT_OUTPUT so the driven level can be read back
                // SAFETY: pin number checked
                unsafe {
                    esp!(sys::gpio_set_direction(num, sys::gpio_mode_t_GPIO_MODE_INPUT_OUTPUT))?;
                    esp!(sys::gpio_set_level(num, 0))?;
                }
            }
            PinMode::Input => Self::input(num, sys::gpio_pull_mode_t_GPIO_FLOATING)?,
            PinMode::InputPullUp | PinMode::Interrupt => {
                Self::input(num, sys::gpio_pull_mode_t_GPIO_PULLUP_ONLY)?
            }
            PinMode::Analog => self.configure_adc(pin)?,
        }
        Ok(())
    }

    fn read_level(&self, pin: u8) -> bool {
        // SAFETY: out-of-range pins read as low
        unsafe { sys::gpio_get_level(pin as sys::gpio_num_t) != 0 }
    }

    fn read_analog(&self, pin: u8) -> u16 {
        let adc = self.adc.lock().unwrap_or_else(PoisonError::into_inner);
        let (Some(unit), Some(&channel)) = (&adc.unit, adc.channels.get(&pin)) else {
            return 0;
        };
        let mut raw: i32 = 0;
        // SAFETY: handle and channel configured in apply_mode
        match esp!(unsafe { sys::adc_oneshot_read(unit.0, channel, &mut raw) }) {
            Ok(()) => raw.clamp(0, u16::MAX as i32) as u16,
            Err(e) => {
                log::debug!("ADC read GPIO{} failed: {:?}", pin, e);
                0
            }
        }
    }

    fn write_level(&self, pin: u8, high: bool) -> Result<(), HalError> {
        let num = Self::check(pin)?;
        // SAFETY: pin number checked
        esp!(unsafe { sys::gpio_set_level(num, high as u32) })?;
        Ok(())
    }

    fn driven_level(&self, pin: u8) -> bool {
        self.read_level(pin)
    }

    fn attach_interrupt(
        &self,
        pin: u8,
        edge: InterruptEdge,
        producer: InterruptProducer,
    ) -> Result<(), HalError> {
        let num = Self::check(pin)?;
        let intr_type = match edge {
            InterruptEdge::Rising => sys::gpio_int_type_t_GPIO_INTR_POSEDGE,
            InterruptEdge::Falling => sys::gpio_int_type_t_GPIO_INTR_NEGEDGE,
            InterruptEdge::Change => sys::gpio_int_type_t_GPIO_INTR_ANYEDGE,
            InterruptEdge::None => return Err(HalError::Unsupported),
        };

        let mut handlers = self.handlers();
        let producer = Box::new(producer);
        let arg = &*producer as *const InterruptProducer as *mut c_void;

        // SAFETY: `arg` stays valid while the Box is in `handlers`
        unsafe {
            esp!(sys::gpio_set_intr_type(num, intr_type))?;
            esp!(sys::gpio_isr_handler_add(num, Some(on_edge), arg))?;
        }

        // SAFETY: pin number checked; the handler was added above
        if let Err(err) = esp!(unsafe { sys::gpio_intr_enable(num) }) {
            // SAFETY: handler added above; `producer` drops only after removal
            unsafe {
                sys::gpio_isr_handler_remove(num);
            }
            return Err(err.into());
        }
        handlers.insert(pin, producer);
        Ok(())
    }

    fn detach_interrupt(&self, pin: u8) {
        let mut handlers = self.handlers();
        if !handlers.contains_key(&pin) {
            return;
        }
        let num = pin as sys::gpio_num_t;
        // SAFETY: handler registered by attach_interrupt
        unsafe {
            sys::gpio_intr_disable(num);
            sys::gpio_isr_handler_remove(num);
        }
        handlers.remove(&pin);
    }
}

/// `esp_timer` clock.
#[derive(Clone, Copy, Default)]
pub struct EspClock;

impl Clock for EspClock {
    fn now_ms(&self) -> u64 {
        // SAFETY: esp_timer_get_time is ISR-safe and always initialised
        (unsafe { sys::esp_timer_get_time() } / 1000) as u64
    }

    fn delay_ms(&self, ms: u32) {
        FreeRtos::delay_ms(ms);
    }
}
