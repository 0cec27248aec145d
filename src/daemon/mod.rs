/*!
The daemon loop.

Every tick the daemon forwards the windows its [`WindowSource`] wants keys for
to the [`PartkeyManager`] admission, then runs the manager maintenance
([`refresh`]). Ticks start doing so only once the keys already on the node
are recovered with [`reconcile_from_node`]; a node down at startup only
delays that recovery, and everything else, to a later tick.

[`WindowSource`]: ./trait.WindowSource.html
[`PartkeyManager`]: ../partkey/manager/struct.PartkeyManager.html
[`refresh`]: ../partkey/manager/struct.PartkeyManager.html#method.refresh
[`reconcile_from_node`]: ../partkey/manager/struct.PartkeyManager.html#method.reconcile_from_node
*/

use crate::{
    node::NodeParticipationClient,
    partkey::{
        manager::Error as ManagerError, Address, AdmissionResult, PartkeyId, PartkeyManager,
        RefreshReport, Round,
    },
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, error::Error as StdError, thread, time::Duration};
use tracing::{span, Level};

/// a validity window an account needs a participation key for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WindowRequest {
    pub address: Address,
    pub first: Round,
    pub last: Round,
    #[serde(default)]
    pub dilution: Option<u64>,
    /// round at which the key is deleted from the node, ahead of its expiry
    #[serde(default)]
    pub delete_at: Option<Round>,
}

impl WindowRequest {
    pub fn id(&self) -> PartkeyId {
        PartkeyId::new(self.address.clone(), self.first, self.last)
    }
}

/// where the windows to hold keys for come from, e.g. the on-chain
/// delegation contracts
pub trait WindowSource {
    type Error: StdError;

    fn windows(&mut self) -> Result<Vec<WindowRequest>, Self::Error>;
}

/// a fixed list of windows, as given in the configuration file
#[derive(Debug, Clone, Default)]
pub struct StaticWindows(Vec<WindowRequest>);

impl StaticWindows {
    pub fn new(windows: Vec<WindowRequest>) -> Self {
        StaticWindows(windows)
    }
}

impl WindowSource for StaticWindows {
    type Error = Infallible;

    fn windows(&mut self) -> Result<Vec<WindowRequest>, Self::Error> {
        Ok(self.0.clone())
    }
}

#[derive(Debug)]
pub struct TickReport {
    pub admissions: Vec<(PartkeyId, AdmissionResult)>,
    pub refresh: RefreshReport,
}

pub struct Daemon<N, S> {
    manager: PartkeyManager<N>,
    source: S,
    interval: Duration,
    reconciled: bool,
}

impl<N, S> Daemon<N, S>
where
    N: NodeParticipationClient,
    S: WindowSource,
{
    pub fn new(manager: PartkeyManager<N>, source: S, interval: Duration) -> Self {
        Daemon {
            manager,
            source,
            interval,
            reconciled: false,
        }
    }

    pub fn manager(&self) -> &PartkeyManager<N> {
        &self.manager
    }

    pub fn manager_mut(&mut self) -> &mut PartkeyManager<N> {
        &mut self.manager
    }

    pub fn is_reconciled(&self) -> bool {
        self.reconciled
    }

    /// tick forever, `interval` apart
    pub fn run(&mut self) {
        let span = span!(Level::TRACE, "daemon", kind = "partkeys");
        let _enter = span.enter();
        tracing::info!(interval = ?self.interval, "participation key manager started");
        loop {
            self.run_once();
            thread::sleep(self.interval);
        }
    }

    /// One tick. Nothing is admitted nor generated until the keys already on
    /// the node have been recovered, so the report of a tick that could not
    /// reconcile is empty.
    pub fn run_once(&mut self) -> Option<TickReport> {
        if !self.ensure_reconciled() {
            return None;
        }
        let admissions = self.admit_windows();
        let refresh = self.manager.refresh();
        Some(TickReport {
            admissions,
            refresh,
        })
    }

    fn ensure_reconciled(&mut self) -> bool {
        if self.reconciled {
            return true;
        }
        match self.manager.reconcile_from_node() {
            Ok(recovered) => {
                tracing::info!(
                    recovered,
                    tracked = self.manager.generated().len(),
                    "participation keys reconciled with the node"
                );
                self.reconciled = true;
            }
            Err(ManagerError::Buffer(error)) => {
                // retrying would only overflow again
                tracing::warn!(
                    %error,
                    tracked = self.manager.generated().len(),
                    "node holds more live participation keys than can be tracked"
                );
                self.reconciled = true;
            }
            Err(error) => {
                tracing::warn!(%error, "cannot reconcile participation keys with the node, will retry")
            }
        }
        self.reconciled
    }

    fn admit_windows(&mut self) -> Vec<(PartkeyId, AdmissionResult)> {
        let windows = match self.source.windows() {
            Ok(windows) => windows,
            Err(error) => {
                tracing::warn!(%error, "cannot read the requested windows");
                return Vec::new();
            }
        };

        let mut admissions = Vec::with_capacity(windows.len());
        for window in windows {
            let result = self.manager.request_generation_with_deletion(
                &window.address,
                window.first,
                window.last,
                window.dilution,
                window.delete_at,
            );
            let key = window.id();
            match result {
                AdmissionResult::Accepted
                | AdmissionResult::AlreadyPending
                | AdmissionResult::AlreadyGenerated => {
                    tracing::debug!(%key, %result, "window admission")
                }
                AdmissionResult::WindowInPast => tracing::info!(%key, %result, "window admission"),
                AdmissionResult::PendingFull
                | AdmissionResult::GeneratedFull
                | AdmissionResult::NodeUnreachable => {
                    tracing::warn!(%key, %result, "window admission")
                }
            }
            admissions.push((key, result));
        }
        admissions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{partkey::Progress, testing::{address, MockNode}};

    fn window(seed: u32, first: u64, last: u64) -> WindowRequest {
        WindowRequest {
            address: address(seed),
            first: Round::new(first),
            last: Round::new(last),
            dilution: None,
            delete_at: None,
        }
    }

    #[test]
    fn reconciliation_retried_until_node_answers() {
        let node = MockNode::new(Round::new(100));
        node.insert_key(&address(1), Round::new(1), Round::new(1000));
        node.set_unreachable(true);
        let manager = PartkeyManager::new(node.clone(), 10, 10);
        let mut daemon = Daemon::new(manager, StaticWindows::default(), Duration::from_secs(1));

        assert!(daemon.run_once().is_none());
        assert!(!daemon.is_reconciled());
        assert!(daemon.manager().generated().is_empty());

        node.set_unreachable(false);
        assert!(daemon.run_once().is_some());
        assert!(daemon.is_reconciled());
        assert_eq!(daemon.manager().generated().len(), 1);
    }

    #[test]
    fn nothing_admitted_before_reconciliation() {
        let node = MockNode::new(Round::new(100));
        node.set_unreachable(true);
        let manager = PartkeyManager::new(node.clone(), 10, 10);
        let source = StaticWindows::new(vec![window(1, 100, 1000)]);
        let mut daemon = Daemon::new(manager, source, Duration::from_secs(1));

        assert!(daemon.run_once().is_none());
        assert!(daemon.manager().pending().is_empty());

        node.set_unreachable(false);
        let report = daemon.run_once().unwrap();
        assert_eq!(report.admissions[0].1, AdmissionResult::Accepted);
        assert!(matches!(report.refresh.progress, Progress::Started(_)));

        node.complete_generation();
        let report = daemon.run_once().unwrap();
        assert!(matches!(report.refresh.progress, Progress::Completed(_)));
        assert_eq!(daemon.manager().generated().len(), 1);
        assert!(daemon.manager().pending().is_empty());
    }

    #[test]
    fn overflowing_reconciliation_does_not_stall_the_loop() {
        let node = MockNode::new(Round::new(100));
        for seed in 1..=3 {
            node.insert_key(&address(seed), Round::new(1), Round::new(1000));
        }
        let manager = PartkeyManager::new(node.clone(), 10, 2);
        let mut daemon = Daemon::new(manager, StaticWindows::default(), Duration::from_secs(1));

        assert!(daemon.run_once().is_some());
        assert!(daemon.is_reconciled());
        assert_eq!(daemon.manager().generated().len(), 2);
    }

    #[test]
    fn windows_are_admitted_every_tick() {
        let node = MockNode::new(Round::new(100));
        let manager = PartkeyManager::new(node.clone(), 10, 10);
        let source = StaticWindows::new(vec![window(1, 100, 1000), window(2, 1, 50)]);
        let mut daemon = Daemon::new(manager, source, Duration::from_secs(1));

        let report = daemon.run_once().unwrap();
        assert_eq!(
            report.admissions,
            vec![
                (window(1, 100, 1000).id(), AdmissionResult::Accepted),
                (window(2, 1, 50).id(), AdmissionResult::WindowInPast),
            ]
        );
        assert_eq!(
            report.refresh.progress,
            Progress::Started(window(1, 100, 1000).id())
        );

        let report = daemon.run_once().unwrap();
        assert_eq!(report.admissions[0].1, AdmissionResult::AlreadyPending);
    }
}
