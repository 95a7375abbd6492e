//! Ford CAN-FD platform (lane centering through `LateralMotionControl`).
//!
//! The controller is wired between the powertrain / chassis bus (bus 0) and
//! the stock IPMA camera (bus 2). It sends driver-control buttons, the
//! lateral motion command and the HUD messages in place of the camera.

use canguard_hal::{LookupTable, SignalSpec};
use canguard_types::{BusId, MessageDescriptor, SafetyError};

use crate::address_monitor::{AddrCheckEntry, AddrCheckVariant, CounterSpec};
use crate::profile::VehicleProfile;
use crate::state_tracker::{RxRule, StateSignal};
use crate::tx_rules::{
    ButtonRule, LateralControlRule, LateralSignals, NeutralValues, PassiveActionRule,
    SteeringLimits,
};

pub const MAIN_BUS: BusId = 0;
pub const CAMERA_BUS: BusId = 2;

// Received from the vehicle.
pub const ENG_BRAKE_DATA: u32 = 0x165;
pub const ENG_VEHICLE_SP_THROTTLE: u32 = 0x204;
pub const DESIRED_TORQ_BRK: u32 = 0x213;
pub const BRAKE_SYS_FEATURES: u32 = 0x415;
pub const YAW_DATA_FD1: u32 = 0x91;

// Sent by the controller.
pub const STEERING_DATA_FD1: u32 = 0x083;
pub const ACCDATA_3: u32 = 0x18A;
pub const LANE_ASSIST_DATA1: u32 = 0x3CA;
pub const LATERAL_MOTION_CONTROL: u32 = 0x3D3;
pub const IPMA_DATA: u32 = 0x3D8;

pub const INACTIVE_CURVATURE: u64 = 1000;
pub const INACTIVE_CURVATURE_RATE: u64 = 4096;
pub const INACTIVE_PATH_OFFSET: u64 = 512;
pub const INACTIVE_PATH_ANGLE: u64 = 1000;

/// Speed breakpoints (m/s) of the curvature rate tables.
const RATE_SPEEDS: [f64; 3] = [7.0, 17.0, 27.0];
const RATE_UP: [f64; 3] = [0.005, 0.00056, 0.0002];
const RATE_DOWN: [f64; 3] = [0.008, 0.00089, 0.00032];

// ── Signals ─────────────────────────────────────────────────────────────────

pub const VEH_V_ACTL_BRK: SignalSpec =
    SignalSpec::be("Veh_V_ActlBrk", 1, 0, 16).scaled(0.01 / 3.6, 0.0);
pub const BRAKE_SYS_FEATURES_COUNTER: SignalSpec =
    SignalSpec::be("VehVActlBrk_No_Cnt", 2, 2, 4);
pub const VEH_YAW_W_ACTL: SignalSpec =
    SignalSpec::be("VehYaw_W_Actl", 3, 0, 16).scaled(0.0002, -6.5);
pub const VEH_YAW_QF: SignalSpec = SignalSpec::be("VehYawWActl_D_Qf", 6, 4, 2);
pub const YAW_DATA_COUNTER: SignalSpec = SignalSpec::be("VehRollYaw_No_Cnt", 5, 0, 8);
pub const VEH_STOP_D_STAT: SignalSpec = SignalSpec::be("VehStop_D_Stat", 3, 3, 2);
pub const APED_POS: SignalSpec = SignalSpec::be("ApedPos_Pc_ActlArb", 1, 0, 10);
pub const BPED_DRV_APPL: SignalSpec = SignalSpec::be("BpedDrvAppl_D_Actl", 0, 4, 2);
pub const CC_STAT: SignalSpec = SignalSpec::be("CcStat_D_Actl", 1, 0, 3);
pub const CANCEL_BUTTON: SignalSpec = SignalSpec::be("CcAslButtnCnclPress", 1, 0, 1);
pub const RESUME_BUTTON: SignalSpec = SignalSpec::be("CcAsllButtnResPress", 3, 1, 1);
pub const LKA_ACTION: SignalSpec = SignalSpec::be("LkaActvStats_D2_Req", 0, 5, 3);

pub const LATERAL_SIGNALS: LateralSignals = LateralSignals {
    control_type: SignalSpec::be("LatCtl_D_Rq", 4, 2, 3),
    curvature: SignalSpec::be("LatCtlCurv_No_Actl", 1, 5, 11).scaled(2e-5, -0.02),
    curvature_rate: SignalSpec::be("LatCtlCurv_NoRate_Actl", 2, 0, 13),
    path_angle: SignalSpec::be("LatCtlPath_An_Actl", 4, 5, 11),
    path_offset: SignalSpec::be("LatCtlPathOffst_L_Actl", 6, 6, 10),
};

pub const LATERAL_NEUTRAL: NeutralValues = NeutralValues {
    curvature: INACTIVE_CURVATURE,
    curvature_rate: INACTIVE_CURVATURE_RATE,
    path_angle: INACTIVE_PATH_ANGLE,
    path_offset: INACTIVE_PATH_OFFSET,
};

// ── Tables ──────────────────────────────────────────────────────────────────

fn tx_allow_list() -> Vec<MessageDescriptor> {
    vec![
        MessageDescriptor::new(STEERING_DATA_FD1, MAIN_BUS, 8),
        MessageDescriptor::new(STEERING_DATA_FD1, CAMERA_BUS, 8),
        MessageDescriptor::new(ACCDATA_3, MAIN_BUS, 8),
        MessageDescriptor::new(LANE_ASSIST_DATA1, MAIN_BUS, 8),
        MessageDescriptor::new(LATERAL_MOTION_CONTROL, MAIN_BUS, 8),
        MessageDescriptor::new(IPMA_DATA, MAIN_BUS, 8),
    ]
}

fn addr_checks() -> Vec<AddrCheckEntry> {
    let main = |address| MessageDescriptor::new(address, MAIN_BUS, 8);
    vec![
        AddrCheckEntry::single(AddrCheckVariant::new(main(BRAKE_SYS_FEATURES), 20_000).with_counter(
            CounterSpec {
                signal: BRAKE_SYS_FEATURES_COUNTER,
                max: 15,
            },
        )),
        AddrCheckEntry::single(AddrCheckVariant::new(main(YAW_DATA_FD1), 10_000).with_counter(
            CounterSpec {
                signal: YAW_DATA_COUNTER,
                max: 255,
            },
        )),
        // No counter or checksum on these.
        AddrCheckEntry::single(AddrCheckVariant::new(main(ENG_BRAKE_DATA), 100_000)),
        AddrCheckEntry::single(AddrCheckVariant::new(main(ENG_VEHICLE_SP_THROTTLE), 10_000)),
        AddrCheckEntry::single(AddrCheckVariant::new(main(DESIRED_TORQ_BRK), 20_000)),
    ]
}

fn rx_rules() -> Vec<RxRule> {
    let main = |address, update| RxRule {
        address,
        bus: MAIN_BUS,
        update,
    };
    vec![
        main(
            DESIRED_TORQ_BRK,
            StateSignal::Standstill {
                signal: VEH_STOP_D_STAT,
                moving_value: 0,
            },
        ),
        main(
            BRAKE_SYS_FEATURES,
            StateSignal::Speed {
                signal: VEH_V_ACTL_BRK,
            },
        ),
        main(
            YAW_DATA_FD1,
            StateSignal::YawRate {
                signal: VEH_YAW_W_ACTL,
                quality: VEH_YAW_QF,
                quality_ok: 3,
            },
        ),
        main(ENG_VEHICLE_SP_THROTTLE, StateSignal::Gas { signal: APED_POS }),
        // Brake before cruise so engagement sees the current pedal.
        main(
            ENG_BRAKE_DATA,
            StateSignal::Brake {
                signal: BPED_DRV_APPL,
                pressed_value: 2,
            },
        ),
        main(
            ENG_BRAKE_DATA,
            StateSignal::Cruise {
                signal: CC_STAT,
                engaged_values: vec![4, 5],
            },
        ),
        main(
            STEERING_DATA_FD1,
            StateSignal::CancelButton {
                signal: CANCEL_BUTTON,
            },
        ),
    ]
}

/// Build the Ford profile.
///
/// # Errors
///
/// [`SafetyError::InvalidProfile`] if a rate table is malformed.
pub fn profile() -> Result<VehicleProfile, SafetyError> {
    let steering_limits = SteeringLimits {
        rate_up: LookupTable::new(&RATE_SPEEDS, &RATE_UP)?,
        rate_down: LookupTable::new(&RATE_SPEEDS, &RATE_DOWN)?,
        max_curvature: None,
        yaw_plausibility: None,
    };

    Ok(VehicleProfile {
        name: "ford",
        main_bus: MAIN_BUS,
        camera_bus: CAMERA_BUS,
        tx_allow_list: tx_allow_list(),
        addr_checks: addr_checks(),
        rx_rules: rx_rules(),
        stock_lkas_addresses: vec![ACCDATA_3, LANE_ASSIST_DATA1, LATERAL_MOTION_CONTROL, IPMA_DATA],
        steering_limits: steering_limits.clone(),
        tx_rules: vec![
            Box::new(ButtonRule {
                address: STEERING_DATA_FD1,
                cancel: CANCEL_BUTTON,
                resume: RESUME_BUTTON,
            }),
            Box::new(PassiveActionRule {
                address: LANE_ASSIST_DATA1,
                action: LKA_ACTION,
                inactive: 0,
            }),
            Box::new(LateralControlRule {
                address: LATERAL_MOTION_CONTROL,
                signals: LATERAL_SIGNALS,
                neutral: LATERAL_NEUTRAL,
                limits: steering_limits,
            }),
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use canguard_types::CanFrame;

    #[test]
    fn neutral_lateral_curvature_is_zero() {
        let mut frame = CanFrame::new(MAIN_BUS, LATERAL_MOTION_CONTROL, &[0; 8]).unwrap();
        LATERAL_SIGNALS.curvature.write(&mut frame, INACTIVE_CURVATURE);
        assert!(LATERAL_SIGNALS.curvature.value(&frame).abs() < 1e-12);
    }

    #[test]
    fn signal_layout_matches_byte_extraction() {
        let data = [0xAB, 0xCD, 0xEF, 0x12, 0x34, 0x56, 0x78, 0x9A];
        let frame = CanFrame::new(MAIN_BUS, LATERAL_MOTION_CONTROL, &data).unwrap();
        let b = |i: usize| u64::from(data[i]);

        assert_eq!(LATERAL_SIGNALS.control_type.raw(&frame), (b(4) >> 2) & 0x7);
        assert_eq!(LATERAL_SIGNALS.curvature.raw(&frame), (b(0) << 3) | (b(1) >> 5));
        assert_eq!(LATERAL_SIGNALS.curvature_rate.raw(&frame), ((b(1) & 0x1F) << 8) | b(2));
        assert_eq!(LATERAL_SIGNALS.path_angle.raw(&frame), (b(3) << 3) | (b(4) >> 5));
        assert_eq!(LATERAL_SIGNALS.path_offset.raw(&frame), (b(5) << 2) | (b(6) >> 6));
        assert_eq!(BRAKE_SYS_FEATURES_COUNTER.raw(&frame), (b(2) >> 2) & 0xF);
        assert_eq!(YAW_DATA_COUNTER.raw(&frame), b(5));
        assert_eq!(VEH_YAW_QF.raw(&frame), (b(6) >> 4) & 0x3);
        assert_eq!(APED_POS.raw(&frame), ((b(0) & 0x03) << 8) | b(1));
        assert_eq!(BPED_DRV_APPL.raw(&frame), (b(0) >> 4) & 0x3);
        assert_eq!(CC_STAT.raw(&frame), b(1) & 0x7);
        assert_eq!(VEH_STOP_D_STAT.raw(&frame), (b(3) >> 3) & 0x3);
        assert_eq!(LKA_ACTION.raw(&frame), b(0) >> 5);
        assert_eq!(CANCEL_BUTTON.raw(&frame), u64::from(frame.bit(8)));
        assert_eq!(RESUME_BUTTON.raw(&frame), u64::from(frame.bit(25)));
    }

    #[test]
    fn rx_table_has_one_entry_per_source() {
        let p = profile().unwrap();
        assert_eq!(p.addr_checks.len(), 5);
        assert_eq!(p.tx_allow_list.len(), 6);
        assert_eq!(p.tx_rules.len(), 3);
        assert!(p.steering_limits.max_curvature.is_none());
    }
}
