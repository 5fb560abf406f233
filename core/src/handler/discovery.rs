//! Startup registration pass.
//!
//! Every component that owns handlers implements [`EventController`] and is
//! handed to [`HandlerDiscovery`] when the process is composed. `run` walks
//! the controllers once, validates their declarations and fills the
//! [`HandlerRegistry`] before the first message is consumed.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use super::descriptor::HandlerDescriptor;
use super::error::DiscoveryError;
use super::registry::HandlerRegistry;

/// A component declaring one or more event handlers bound to itself.
pub trait EventController: Send + Sync + 'static {
    /// Name used in logs and conflict reports
    fn name(&self) -> &str;

    /// The handlers this component provides, each bound to `self`
    fn handlers(self: Arc<Self>) -> Vec<HandlerDescriptor>;
}

/// What to do when two declarations claim the same event type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Last declaration processed wins; the collision is logged
    #[default]
    Warn,
    /// Any collision aborts startup
    Reject,
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "warn" => Ok(ConflictPolicy::Warn),
            "reject" => Ok(ConflictPolicy::Reject),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::Warn => f.write_str("warn"),
            ConflictPolicy::Reject => f.write_str("reject"),
        }
    }
}

/// Summary of a discovery pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Controller names, in the order they were walked
    pub controllers: Vec<String>,
    /// Event types registered by this pass
    pub registered: Vec<String>,
    /// Event types that replaced an earlier handler (only under `Warn`)
    pub conflicts: Vec<String>,
}

/// Collects handler declarations and registers them exactly once.
pub struct HandlerDiscovery {
    policy: ConflictPolicy,
    controllers: Vec<Arc<dyn EventController>>,
    standalone: Vec<HandlerDescriptor>,
    ran: AtomicBool,
}

impl Default for HandlerDiscovery {
    fn default() -> Self {
        Self::new(ConflictPolicy::default())
    }
}

impl HandlerDiscovery {
    pub fn new(policy: ConflictPolicy) -> Self {
        Self {
            policy,
            controllers: Vec::new(),
            standalone: Vec::new(),
            ran: AtomicBool::new(false),
        }
    }

    pub fn policy(&self) -> ConflictPolicy {
        self.policy
    }

    pub fn controller<C: EventController>(mut self, controller: Arc<C>) -> Self {
        self.add_controller(controller);
        self
    }

    pub fn add_controller(&mut self, controller: Arc<dyn EventController>) {
        self.controllers.push(controller);
    }

    /// Declare a handler that does not belong to a controller
    pub fn handler(mut self, descriptor: HandlerDescriptor) -> Self {
        self.add_handler(descriptor);
        self
    }

    pub fn add_handler(&mut self, descriptor: HandlerDescriptor) {
        self.standalone.push(descriptor);
    }

    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::SeqCst)
    }

    /// Walk every declaration and register it.
    ///
    /// Only the first call does any work; later calls fail with
    /// [`DiscoveryError::AlreadyRan`], including after a failed first call.
    /// Declarations are validated as a batch, so a configuration error
    /// leaves the registry untouched.
    pub fn run(&self, registry: &HandlerRegistry) -> Result<DiscoveryReport, DiscoveryError> {
        if self.ran.swap(true, Ordering::SeqCst) {
            return Err(DiscoveryError::AlreadyRan);
        }

        let mut report = DiscoveryReport::default();
        let mut declarations = Vec::new();
        for controller in &self.controllers {
            let name = controller.name().to_string();
            for descriptor in Arc::clone(controller).handlers() {
                let descriptor = if descriptor.controller().is_none() {
                    descriptor.with_controller(name.clone())
                } else {
                    descriptor
                };
                declarations.push(descriptor);
            }
            report.controllers.push(name);
        }
        declarations.extend(self.standalone.iter().cloned());

        info!(
            target: "handler_discovery",
            controllers = ?report.controllers,
            declarations = declarations.len(),
            policy = %self.policy,
            "Found event controllers"
        );

        self.validate(registry, &declarations)?;

        for descriptor in declarations {
            let event_type = descriptor.event_type().to_string();
            if registry.register(descriptor).is_some() {
                report.conflicts.push(event_type.clone());
            }
            report.registered.push(event_type);
        }

        if !report.conflicts.is_empty() {
            warn!(
                target: "handler_discovery",
                conflicts = ?report.conflicts,
                "Some event types were registered more than once; the last declaration won"
            );
        }
        info!(
            target: "handler_discovery",
            registered = report.registered.len(),
            total = registry.len(),
            "Handler discovery complete"
        );
        Ok(report)
    }

    fn validate(
        &self,
        registry: &HandlerRegistry,
        declarations: &[HandlerDescriptor],
    ) -> Result<(), DiscoveryError> {
        let mut claimed: HashMap<&str, &str> = HashMap::new();
        for descriptor in declarations {
            let event_type = descriptor.event_type();
            if event_type.trim().is_empty() {
                return Err(DiscoveryError::EmptyEventType {
                    origin: descriptor.origin().to_string(),
                });
            }
            if self.policy != ConflictPolicy::Reject {
                continue;
            }

            let existing = claimed
                .get(event_type)
                .map(|origin| origin.to_string())
                .or_else(|| registry.lookup(event_type).map(|d| d.origin().to_string()));
            if let Some(existing) = existing {
                return Err(DiscoveryError::Conflict {
                    event_type: event_type.to_string(),
                    existing,
                    incoming: descriptor.origin().to_string(),
                });
            }
            claimed.insert(event_type, descriptor.origin());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerResult;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Payload;

    async fn noop(_: Payload) -> HandlerResult {
        Ok(())
    }

    struct Billing;

    impl EventController for Billing {
        fn name(&self) -> &str {
            "Billing"
        }

        fn handlers(self: Arc<Self>) -> Vec<HandlerDescriptor> {
            vec![
                HandlerDescriptor::from_fn("INVOICE_SENT", noop),
                HandlerDescriptor::from_fn("INVOICE_PAID", noop),
            ]
        }
    }

    struct Audit;

    impl EventController for Audit {
        fn name(&self) -> &str {
            "Audit"
        }

        fn handlers(self: Arc<Self>) -> Vec<HandlerDescriptor> {
            vec![HandlerDescriptor::from_fn("INVOICE_PAID", noop)]
        }
    }

    #[test]
    fn registers_every_controller_handler() {
        let registry = HandlerRegistry::new();
        let report = HandlerDiscovery::default()
            .controller(Arc::new(Billing))
            .run(&registry)
            .unwrap();

        assert_eq!(report.controllers, vec!["Billing"]);
        assert_eq!(registry.event_types(), vec!["INVOICE_PAID", "INVOICE_SENT"]);
        assert_eq!(
            registry.lookup("INVOICE_SENT").unwrap().controller(),
            Some("Billing")
        );
    }

    #[test]
    fn runs_only_once() {
        let registry = HandlerRegistry::new();
        let discovery = HandlerDiscovery::default().controller(Arc::new(Billing));

        discovery.run(&registry).unwrap();
        assert!(discovery.has_run());
        assert_eq!(discovery.run(&registry), Err(DiscoveryError::AlreadyRan));
    }

    #[test]
    fn warn_policy_keeps_last_declaration() {
        let registry = HandlerRegistry::new();
        let report = HandlerDiscovery::new(ConflictPolicy::Warn)
            .controller(Arc::new(Billing))
            .controller(Arc::new(Audit))
            .run(&registry)
            .unwrap();

        assert_eq!(report.conflicts, vec!["INVOICE_PAID"]);
        assert_eq!(
            registry.lookup("INVOICE_PAID").unwrap().controller(),
            Some("Audit")
        );
    }

    #[test]
    fn reject_policy_fails_without_registering() {
        let registry = HandlerRegistry::new();
        let err = HandlerDiscovery::new(ConflictPolicy::Reject)
            .controller(Arc::new(Billing))
            .controller(Arc::new(Audit))
            .run(&registry)
            .unwrap_err();

        assert_eq!(
            err,
            DiscoveryError::Conflict {
                event_type: "INVOICE_PAID".into(),
                existing: "Billing".into(),
                incoming: "Audit".into(),
            }
        );
        assert!(registry.is_empty());
    }

    #[test]
    fn reject_policy_sees_prior_registrations() {
        let registry = HandlerRegistry::new();
        registry.register(HandlerDescriptor::from_fn("INVOICE_SENT", noop).with_controller("Legacy"));

        let err = HandlerDiscovery::new(ConflictPolicy::Reject)
            .controller(Arc::new(Billing))
            .run(&registry)
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::Conflict { ref existing, .. } if existing == "Legacy"));
    }

    #[test]
    fn empty_event_type_is_a_configuration_error() {
        let registry = HandlerRegistry::new();
        let err = HandlerDiscovery::default()
            .handler(HandlerDescriptor::from_fn("  ", noop))
            .run(&registry)
            .unwrap_err();
        assert!(matches!(err, DiscoveryError::EmptyEventType { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn conflict_policy_parses() {
        assert_eq!("Reject".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Reject));
        assert_eq!(" warn ".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Warn));
        assert!("panic".parse::<ConflictPolicy>().is_err());
    }
}
