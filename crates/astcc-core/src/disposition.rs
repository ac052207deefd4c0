//! Coin dispositions and the fixed disposition → hardware action table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::controller::{CoinController, HardwareError};
use crate::device::DeviceId;

/// Name of the manager event carrying coin dispositions.
pub const COIN_DISPOSITION_EVENT: &str = "CoinDisposition";

/// Outcome code attached to a coin-related occurrence on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Disposition {
    CoinReturn,
    CoinCollect,
    OperatorRingback,
    OperatorReleased,
    OperatorAttached,
    CoinCollectOperatorReleased,
}

/// A disposition string outside the known set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized coin disposition: {0}")]
pub struct UnknownDisposition(pub String);

impl Disposition {
    pub const ALL: [Disposition; 6] = [
        Disposition::CoinReturn,
        Disposition::CoinCollect,
        Disposition::OperatorRingback,
        Disposition::OperatorReleased,
        Disposition::OperatorAttached,
        Disposition::CoinCollectOperatorReleased,
    ];

    /// Wire name as sent in the `Disposition` header.
    pub fn as_str(self) -> &'static str {
        match self {
            Disposition::CoinReturn => "CoinReturn",
            Disposition::CoinCollect => "CoinCollect",
            Disposition::OperatorRingback => "OperatorRingback",
            Disposition::OperatorReleased => "OperatorReleased",
            Disposition::OperatorAttached => "OperatorAttached",
            Disposition::CoinCollectOperatorReleased => "CoinCollectOperatorReleased",
        }
    }

    /// Hardware actions for this disposition, in invocation order.
    pub fn actions(self) -> &'static [HardwareAction] {
        match self {
            Disposition::CoinReturn => &[HardwareAction::CoinReturn],
            Disposition::CoinCollect => &[HardwareAction::CoinCollect],
            Disposition::OperatorRingback => &[HardwareAction::OperatorRingback],
            Disposition::OperatorReleased => &[HardwareAction::OperatorReleased],
            Disposition::OperatorAttached => &[HardwareAction::OperatorAttached],
            Disposition::CoinCollectOperatorReleased => &[
                HardwareAction::CoinCollect,
                HardwareAction::OperatorReleased,
            ],
        }
    }
}

impl FromStr for Disposition {
    type Err = UnknownDisposition;

    /// Exact, case-sensitive match on the wire name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Disposition::ALL
            .into_iter()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| UnknownDisposition(s.to_owned()))
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One physical operation on a coin line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HardwareAction {
    /// -130 V coin return.
    CoinReturn,
    /// +130 V coin collect.
    CoinCollect,
    /// Positive battery: keypad disabled while an operator is on the line.
    OperatorAttached,
    /// Negative battery: keypad enabled again.
    OperatorReleased,
    /// Ring back the pay station.
    OperatorRingback,
}

impl HardwareAction {
    pub const ALL: [HardwareAction; 5] = [
        HardwareAction::CoinReturn,
        HardwareAction::CoinCollect,
        HardwareAction::OperatorAttached,
        HardwareAction::OperatorReleased,
        HardwareAction::OperatorRingback,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            HardwareAction::CoinReturn => "coin_return",
            HardwareAction::CoinCollect => "coin_collect",
            HardwareAction::OperatorAttached => "operator_attached",
            HardwareAction::OperatorReleased => "operator_released",
            HardwareAction::OperatorRingback => "operator_ringback",
        }
    }

    /// Call the controller method matching this action.
    pub fn invoke<C>(self, controller: &mut C, device: &DeviceId) -> Result<(), HardwareError>
    where
        C: CoinController + ?Sized,
    {
        match self {
            HardwareAction::CoinReturn => controller.coin_return(device),
            HardwareAction::CoinCollect => controller.coin_collect(device),
            HardwareAction::OperatorAttached => controller.operator_attached(device),
            HardwareAction::OperatorReleased => controller.operator_released(device),
            HardwareAction::OperatorRingback => controller.operator_ringback(device),
        }
    }
}

impl fmt::Display for HardwareAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_table() {
        use HardwareAction::*;
        let cases: [(Disposition, &[HardwareAction]); 6] = [
            (Disposition::CoinReturn, &[CoinReturn]),
            (Disposition::CoinCollect, &[CoinCollect]),
            (Disposition::OperatorRingback, &[OperatorRingback]),
            (Disposition::OperatorReleased, &[OperatorReleased]),
            (Disposition::OperatorAttached, &[OperatorAttached]),
            (
                Disposition::CoinCollectOperatorReleased,
                &[CoinCollect, OperatorReleased],
            ),
        ];
        for (disposition, expected) in cases {
            assert_eq!(
                disposition.actions(),
                expected,
                "disposition={disposition} has wrong actions"
            );
        }
    }

    #[test]
    fn parse_every_wire_name() {
        for d in Disposition::ALL {
            assert_eq!(d.as_str().parse::<Disposition>(), Ok(d));
        }
    }

    #[test]
    fn parse_is_case_sensitive() {
        let err = "coinreturn".parse::<Disposition>().unwrap_err();
        assert_eq!(err, UnknownDisposition("coinreturn".to_owned()));
    }

    #[test]
    fn parse_unknown() {
        assert!("CoinJam".parse::<Disposition>().is_err());
        assert!("".parse::<Disposition>().is_err());
    }

    #[test]
    fn action_names() {
        assert_eq!(HardwareAction::CoinReturn.to_string(), "coin_return");
        assert_eq!(
            HardwareAction::OperatorReleased.to_string(),
            "operator_released"
        );
    }
}
