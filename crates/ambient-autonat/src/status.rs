//! NAT status state machine
//!
//! A detection cycle probes peers one after another. Each probe result is fed
//! to a [`CycleTally`], which decides whether the cycle can stop early. The
//! final [`CycleOutcome`] is then committed to the [`StatusRecord`] in one
//! step, so readers never see a half-applied cycle.
//!
//! # Transition rules
//!
//! | Cycle outcome                                         | Status  | Confidence    |
//! |-------------------------------------------------------|---------|---------------|
//! | any successful dial back (stops the cycle)            | Public  | 0             |
//! | 3 dial errors, or 1 while already at max (stops)      | Private | 3             |
//! | peers exhausted with at least one dial error          | Private | +1 (max 3)    |
//! | peers exhausted without any dial error                | Unknown | 0             |
//!
//! A cycle with no peers to probe is never run and changes nothing.

use crate::error::{AutoNatError, ProbeError, Result};
use crate::host::NetAddr;
use std::fmt;

/// Upper bound of the confidence counter
pub const MAX_CONFIDENCE: u8 = 3;

/// Dial errors within one cycle that confirm a private status outright
pub const DIAL_FAILURE_THRESHOLD: u32 = 3;

/// NAT status as seen by the ambient detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NatStatus {
    /// Not yet decided, or the last cycle was inconclusive
    #[default]
    Unknown,
    /// Publicly dialable
    Public,
    /// Behind a NAT or firewall
    Private,
}

impl fmt::Display for NatStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "Unknown"),
            Self::Public => write!(f, "Public"),
            Self::Private => write!(f, "Private"),
        }
    }
}

/// Hysteresis counter in `[0, MAX_CONFIDENCE]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Confidence(u8);

impl Confidence {
    /// Saturated confidence
    pub const MAX: Confidence = Confidence(MAX_CONFIDENCE);

    /// Create a confidence value, clamped to the valid range
    #[must_use]
    pub const fn new(value: u8) -> Self {
        if value > MAX_CONFIDENCE {
            Self(MAX_CONFIDENCE)
        } else {
            Self(value)
        }
    }

    /// Current value
    #[must_use]
    pub const fn get(self) -> u8 {
        self.0
    }

    /// Next value, saturating at the maximum
    #[must_use]
    pub const fn increment(self) -> Self {
        Self::new(self.0.saturating_add(1))
    }

    /// Whether the counter has reached the maximum
    #[must_use]
    pub const fn is_saturated(self) -> bool {
        self.0 >= MAX_CONFIDENCE
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.0, MAX_CONFIDENCE)
    }
}

/// Result of one completed detection cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// A peer dialed us back at this address
    Public(NetAddr),
    /// Enough dial errors to confirm a private status immediately
    PrivateConfirmed,
    /// Some dial errors, not yet conclusive
    PrivateSuspected,
    /// No dial errors and no success
    Inconclusive,
}

/// Per-cycle accumulator of probe results
///
/// Results are fed in probe order until [`is_decided`](Self::is_decided)
/// turns true; [`finish`](Self::finish) then yields the outcome to commit.
#[derive(Debug, Clone)]
pub struct CycleTally {
    prior_confidence: Confidence,
    dial_failures: u32,
    decisive: Option<CycleOutcome>,
}

impl CycleTally {
    /// Start a cycle given the confidence held before it began
    #[must_use]
    pub fn new(prior_confidence: Confidence) -> Self {
        Self {
            prior_confidence,
            dial_failures: 0,
            decisive: None,
        }
    }

    /// Fold results in order, stopping at the first decisive one
    ///
    /// Results past the decisive one are never pulled from the iterator.
    /// Returns `None` when `results` is empty: a cycle with nothing to probe
    /// has no outcome.
    pub fn run<I>(prior_confidence: Confidence, results: I) -> Option<CycleOutcome>
    where
        I: IntoIterator<Item = std::result::Result<NetAddr, ProbeError>>,
    {
        let mut tally = Self::new(prior_confidence);
        let mut probed = false;

        for result in results {
            probed = true;
            if tally.record(result).is_some() {
                break;
            }
        }

        probed.then(|| tally.finish())
    }

    /// Fold one probe result into the tally
    ///
    /// Returns `Some` when the cycle is decided and must stop probing
    /// further peers. Once decided, later results are ignored.
    pub fn record(
        &mut self,
        result: std::result::Result<NetAddr, ProbeError>,
    ) -> Option<CycleOutcome> {
        if self.decisive.is_some() {
            return self.decisive.clone();
        }

        self.decisive = match result {
            Ok(addr) => Some(CycleOutcome::Public(addr)),
            Err(e) if e.is_dial_error() => {
                self.dial_failures += 1;
                if self.dial_failures >= DIAL_FAILURE_THRESHOLD
                    || self.prior_confidence.is_saturated()
                {
                    Some(CycleOutcome::PrivateConfirmed)
                } else {
                    None
                }
            }
            Err(_) => None,
        };

        self.decisive.clone()
    }

    /// Whether a decisive result has been recorded
    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.decisive.is_some()
    }

    /// Dial errors recorded so far in this cycle
    #[must_use]
    pub fn dial_failures(&self) -> u32 {
        self.dial_failures
    }

    /// Outcome of the cycle
    ///
    /// The decisive outcome if one was recorded, otherwise the result of
    /// exhausting every selected peer.
    #[must_use]
    pub fn finish(self) -> CycleOutcome {
        match self.decisive {
            Some(outcome) => outcome,
            None if self.dial_failures > 0 => CycleOutcome::PrivateSuspected,
            None => CycleOutcome::Inconclusive,
        }
    }
}

/// The single source of truth: status, confidence and public address
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusRecord {
    status: NatStatus,
    confidence: Confidence,
    public_addr: Option<NetAddr>,
}

impl StatusRecord {
    /// Fresh record: unknown status, zero confidence
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> NatStatus {
        self.status
    }

    /// Current confidence
    #[must_use]
    pub fn confidence(&self) -> Confidence {
        self.confidence
    }

    /// Public address, only while the status is public
    ///
    /// # Errors
    ///
    /// Returns `NotPublic` for any other status.
    pub fn public_addr(&self) -> Result<&NetAddr> {
        match (&self.status, &self.public_addr) {
            (NatStatus::Public, Some(addr)) => Ok(addr),
            _ => Err(AutoNatError::NotPublic),
        }
    }

    /// Commit a cycle outcome, returning the status held before it
    pub fn apply(&mut self, outcome: CycleOutcome) -> NatStatus {
        let previous = self.status;

        match outcome {
            CycleOutcome::Public(addr) => {
                self.status = NatStatus::Public;
                self.confidence = Confidence::default();
                self.public_addr = Some(addr);
            }
            CycleOutcome::PrivateConfirmed => {
                self.status = NatStatus::Private;
                self.confidence = Confidence::MAX;
                self.public_addr = None;
            }
            CycleOutcome::PrivateSuspected => {
                self.status = NatStatus::Private;
                self.confidence = self.confidence.increment();
                self.public_addr = None;
            }
            CycleOutcome::Inconclusive => {
                self.status = NatStatus::Unknown;
                self.confidence = Confidence::default();
                self.public_addr = None;
            }
        }

        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(s: &str) -> NetAddr {
        s.parse().unwrap()
    }

    fn dial_err() -> std::result::Result<NetAddr, ProbeError> {
        Err(ProbeError::DialFailed("connection refused".into()))
    }

    fn other_err() -> std::result::Result<NetAddr, ProbeError> {
        Err(ProbeError::Timeout)
    }

    fn run_cycle(
        record: &mut StatusRecord,
        results: Vec<std::result::Result<NetAddr, ProbeError>>,
    ) -> Option<CycleOutcome> {
        let outcome = CycleTally::run(record.confidence(), results)?;
        record.apply(outcome.clone());
        Some(outcome)
    }

    fn record_with(status: NatStatus, confidence: u8) -> StatusRecord {
        StatusRecord {
            status,
            confidence: Confidence::new(confidence),
            public_addr: None,
        }
    }

    #[test]
    fn test_initial_state() {
        let record = StatusRecord::new();
        assert_eq!(record.status(), NatStatus::Unknown);
        assert_eq!(record.confidence().get(), 0);
        assert_eq!(record.public_addr(), Err(AutoNatError::NotPublic));
    }

    #[test]
    fn test_single_success_is_public() {
        let mut record = StatusRecord::new();
        run_cycle(&mut record, vec![Ok(addr("/ip4/1.2.3.4/tcp/4001"))]);

        assert_eq!(record.status(), NatStatus::Public);
        assert_eq!(record.confidence().get(), 0);
        assert_eq!(record.public_addr().unwrap().as_str(), "/ip4/1.2.3.4/tcp/4001");
    }

    #[test]
    fn test_three_dial_errors_confirm_private() {
        let mut record = StatusRecord::new();
        let outcome = run_cycle(&mut record, vec![dial_err(), dial_err(), dial_err()]);

        assert_eq!(outcome, Some(CycleOutcome::PrivateConfirmed));
        assert_eq!(record.status(), NatStatus::Private);
        assert_eq!(record.confidence().get(), 3);
    }

    #[test]
    fn test_three_dial_errors_stop_before_fourth_peer() {
        let mut tally = CycleTally::new(Confidence::default());
        assert!(tally.record(dial_err()).is_none());
        assert!(tally.record(dial_err()).is_none());
        assert_eq!(
            tally.record(dial_err()),
            Some(CycleOutcome::PrivateConfirmed)
        );
        assert_eq!(tally.dial_failures(), 3);
    }

    #[test]
    fn test_three_dial_errors_regardless_of_prior_confidence() {
        for prior in 0..=MAX_CONFIDENCE {
            for status in [NatStatus::Unknown, NatStatus::Public, NatStatus::Private] {
                let mut record = record_with(status, prior);
                run_cycle(&mut record, vec![dial_err(), dial_err(), dial_err()]);
                assert_eq!(record.status(), NatStatus::Private);
                assert_eq!(record.confidence(), Confidence::MAX);
            }
        }
    }

    #[test]
    fn test_single_dial_error_is_suspected_private() {
        let mut record = StatusRecord::new();
        let outcome = run_cycle(&mut record, vec![dial_err()]);

        assert_eq!(outcome, Some(CycleOutcome::PrivateSuspected));
        assert_eq!(record.status(), NatStatus::Private);
        assert_eq!(record.confidence().get(), 1);
    }

    #[test]
    fn test_threshold_crossing_across_cycles() {
        let mut record = record_with(NatStatus::Private, 2);
        run_cycle(&mut record, vec![dial_err(), other_err(), dial_err()]);

        assert_eq!(record.status(), NatStatus::Private);
        assert_eq!(record.confidence().get(), 3);
    }

    #[test]
    fn test_run_stops_pulling_after_decisive_result() {
        let mut pulled = 0;
        let results = [other_err(), Ok(addr("/ip4/1.2.3.4/tcp/4001")), dial_err(), dial_err()]
            .into_iter()
            .inspect(|_| pulled += 1);

        let outcome = CycleTally::run(Confidence::default(), results);
        assert_eq!(
            outcome,
            Some(CycleOutcome::Public(addr("/ip4/1.2.3.4/tcp/4001")))
        );
        assert_eq!(pulled, 2);
    }

    #[test]
    fn test_run_empty_has_no_outcome() {
        assert_eq!(CycleTally::run(Confidence::MAX, Vec::new()), None);
    }

    #[test]
    fn test_record_after_decision_is_ignored() {
        let mut tally = CycleTally::new(Confidence::default());
        tally.record(Ok(addr("/ip4/1.2.3.4/tcp/4001")));
        assert!(tally.is_decided());

        tally.record(dial_err());
        assert_eq!(tally.dial_failures(), 0);
        assert_eq!(
            tally.finish(),
            CycleOutcome::Public(addr("/ip4/1.2.3.4/tcp/4001"))
        );
    }

    #[test]
    fn test_saturated_confidence_stops_on_first_dial_error() {
        let mut tally = CycleTally::new(Confidence::MAX);
        assert_eq!(
            tally.record(dial_err()),
            Some(CycleOutcome::PrivateConfirmed)
        );
    }

    #[test]
    fn test_confidence_saturates() {
        let mut record = StatusRecord::new();
        for _ in 0..10 {
            run_cycle(&mut record, vec![dial_err(), other_err()]);
        }
        assert_eq!(record.confidence(), Confidence::MAX);
        assert_eq!(record.status(), NatStatus::Private);
    }

    #[test]
    fn test_success_overrides_prior_failures() {
        let mut record = record_with(NatStatus::Private, 3);
        run_cycle(
            &mut record,
            vec![other_err(), Ok(addr("/ip4/5.6.7.8/udp/9000/quic"))],
        );

        assert_eq!(record.status(), NatStatus::Public);
        assert_eq!(record.confidence().get(), 0);
        assert_eq!(
            record.public_addr().unwrap().as_str(),
            "/ip4/5.6.7.8/udp/9000/quic"
        );
    }

    #[test]
    fn test_success_after_dial_errors_in_same_cycle() {
        let mut record = StatusRecord::new();
        run_cycle(
            &mut record,
            vec![dial_err(), dial_err(), Ok(addr("/ip4/1.2.3.4/tcp/4001"))],
        );

        assert_eq!(record.status(), NatStatus::Public);
        assert_eq!(record.confidence().get(), 0);
    }

    #[test]
    fn test_only_other_errors_reset_to_unknown() {
        let mut record = record_with(NatStatus::Private, 2);
        let outcome = run_cycle(&mut record, vec![other_err(), other_err()]);

        assert_eq!(outcome, Some(CycleOutcome::Inconclusive));
        assert_eq!(record.status(), NatStatus::Unknown);
        assert_eq!(record.confidence().get(), 0);
    }

    #[test]
    fn test_leaving_public_hides_address() {
        let mut record = StatusRecord::new();
        run_cycle(&mut record, vec![Ok(addr("/ip4/1.2.3.4/tcp/4001"))]);
        assert!(record.public_addr().is_ok());

        run_cycle(&mut record, vec![dial_err()]);
        assert_eq!(record.public_addr(), Err(AutoNatError::NotPublic));

        run_cycle(&mut record, vec![Ok(addr("/ip4/1.2.3.4/tcp/4001"))]);
        run_cycle(&mut record, vec![other_err()]);
        assert_eq!(record.public_addr(), Err(AutoNatError::NotPublic));
    }

    #[test]
    fn test_empty_cycle_changes_nothing() {
        let mut record = StatusRecord::new();
        run_cycle(&mut record, vec![Ok(addr("/ip4/1.2.3.4/tcp/4001"))]);
        let before = record.clone();

        assert_eq!(run_cycle(&mut record, Vec::new()), None);
        assert_eq!(record, before);
    }

    #[test]
    fn test_apply_reports_previous_status() {
        let mut record = StatusRecord::new();
        assert_eq!(
            record.apply(CycleOutcome::PrivateSuspected),
            NatStatus::Unknown
        );
        assert_eq!(record.apply(CycleOutcome::Inconclusive), NatStatus::Private);
    }

    #[test]
    fn test_display() {
        assert_eq!(NatStatus::Unknown.to_string(), "Unknown");
        assert_eq!(NatStatus::Public.to_string(), "Public");
        assert_eq!(NatStatus::Private.to_string(), "Private");
        assert_eq!(Confidence::new(2).to_string(), "2/3");
    }

    #[test]
    fn test_confidence_clamps() {
        assert_eq!(Confidence::new(200), Confidence::MAX);
        assert_eq!(Confidence::MAX.increment(), Confidence::MAX);
        assert_eq!(Confidence::new(1).increment().get(), 2);
    }

    #[derive(Debug, Clone)]
    enum Probe {
        Success(u8),
        DialError,
        Other,
    }

    fn arb_probe() -> impl Strategy<Value = Probe> {
        prop_oneof![
            any::<u8>().prop_map(Probe::Success),
            Just(Probe::DialError),
            Just(Probe::Other),
        ]
    }

    fn to_result(probe: &Probe) -> std::result::Result<NetAddr, ProbeError> {
        match probe {
            Probe::Success(n) => Ok(addr(&format!("/ip4/10.0.0.{n}/tcp/4001"))),
            Probe::DialError => dial_err(),
            Probe::Other => other_err(),
        }
    }

    proptest! {
        #[test]
        fn confidence_stays_in_range_and_public_tracks_last_success(
            cycles in prop::collection::vec(prop::collection::vec(arb_probe(), 0..6), 0..20),
        ) {
            let mut record = StatusRecord::new();
            let mut last_decisive: Option<std::result::Result<NetAddr, ()>> = None;

            for cycle in &cycles {
                let before = record.clone();
                let mut probed = 0;
                let results = cycle.iter().map(|probe| {
                    probed += 1;
                    let result = to_result(probe);
                    match &result {
                        Ok(a) => last_decisive = Some(Ok(a.clone())),
                        Err(e) if e.is_dial_error() => last_decisive = Some(Err(())),
                        Err(_) => {}
                    }
                    result
                });
                let outcome = CycleTally::run(record.confidence(), results);

                match outcome {
                    None => {
                        prop_assert_eq!(&record, &before);
                    }
                    Some(outcome) => {
                        prop_assert!(probed >= 1);
                        record.apply(outcome);
                    }
                }

                prop_assert!(record.confidence().get() <= MAX_CONFIDENCE);

                match record.status() {
                    NatStatus::Public => {
                        prop_assert_eq!(record.confidence().get(), 0);
                        let expected = last_decisive.clone().and_then(|d| d.ok());
                        prop_assert_eq!(Some(record.public_addr().unwrap().clone()), expected);
                    }
                    NatStatus::Private | NatStatus::Unknown => {
                        prop_assert_eq!(record.public_addr(), Err(AutoNatError::NotPublic));
                    }
                }
            }
        }

        #[test]
        fn three_dial_errors_always_confirm_private(
            prior in 0u8..=MAX_CONFIDENCE,
            others in prop::collection::vec(Just(Probe::Other), 0..4),
        ) {
            let mut record = record_with(NatStatus::Unknown, prior);
            let mut results: Vec<_> = others.iter().map(to_result).collect();
            results.extend([dial_err(), dial_err(), dial_err()]);

            run_cycle(&mut record, results);
            prop_assert_eq!(record.status(), NatStatus::Private);
            prop_assert_eq!(record.confidence(), Confidence::MAX);
        }
    }
}
