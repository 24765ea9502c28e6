use super::selector::Selector;
use super::WatchError;
use crate::proto::reconcile_event_message::ReconcileType;
use crate::proto::{ClientMessage, ReconcileEventMessage, ReconciliationRequest, Resource};
use crate::session::SessionHandle;
use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use kube::api::{Api, DynamicObject, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{ApiResource, Discovery, Scope};
use kube::runtime::controller::{Action, Controller};
use kube::runtime::watcher;
use kube::{Client, ResourceExt};
use owo_colors::OwoColorize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Placed on every watched object so its deletion is observed (and reported
/// upstream) before the object disappears.
pub const FINALIZER: &str = "automation.pilot.sap.com/finalizer";

struct ReconcilerContext {
    client: Client,
    api_resource: ApiResource,
    namespaced: bool,
    /// Namespace pin from the watch configuration, when present.
    namespace: Option<String>,
    reconciler_name: String,
    selector: Selector,
    session: SessionHandle,
    enabled: Arc<AtomicBool>,
    period: Option<Duration>,
}

/// Builds one controller future for a configured resource. The future runs
/// the reconcile loop until the manager token is cancelled.
pub(crate) fn build(
    client: Client,
    discovery: &Discovery,
    reconciler_name: String,
    resource: Resource,
    session: SessionHandle,
    enabled: Arc<AtomicBool>,
    token: CancellationToken,
) -> Result<BoxFuture<'static, ()>, WatchError> {
    let (group, version) = match resource.api_version.split_once('/') {
        Some((group, version)) => (group, version),
        None => ("", resource.api_version.as_str()),
    };
    let gvk = GroupVersionKind::gvk(group, version, &resource.kind);
    let (api_resource, capabilities) = discovery.resolve_gvk(&gvk).ok_or_else(|| {
        WatchError::UnknownKind(format!("{}/{}", resource.api_version, resource.kind))
    })?;

    let namespaced = matches!(capabilities.scope, Scope::Namespaced);
    let namespace = resource.namespace.clone().filter(|ns| !ns.is_empty());
    let api: Api<DynamicObject> = match (&namespace, namespaced) {
        (Some(ns), true) => Api::namespaced_with(client.clone(), ns, &api_resource),
        _ => Api::all_with(client.clone(), &api_resource),
    };

    let selector = Selector::new(&resource.label_selectors, &resource.field_selectors);
    let mut watch_config = watcher::Config::default();
    if let Some(expression) = selector.labels.expression() {
        watch_config = watch_config.labels(expression);
    }

    let period = resource.reconciliation_period_in_minutes;
    let context = Arc::new(ReconcilerContext {
        client,
        api_resource: api_resource.clone(),
        namespaced,
        namespace,
        reconciler_name: reconciler_name.clone(),
        selector,
        session,
        enabled,
        period: (period > 0).then(|| Duration::from_secs(u64::from(period.unsigned_abs()) * 60)),
    });

    println!(
        "{}",
        format!(
            "🌱 Starting controller '{}' for {} {}",
            reconciler_name, resource.api_version, resource.kind
        )
        .green()
    );

    Ok(Controller::new_with(api, watch_config, api_resource)
        .graceful_shutdown_on(token.cancelled_owned())
        .run(reconcile, error_policy, context)
        .for_each(|_| async {})
        .boxed())
}

impl ReconcilerContext {
    fn api_for(&self, namespace: Option<&str>) -> Api<DynamicObject> {
        match (self.namespaced, namespace) {
            (true, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &self.api_resource),
            (true, None) => Api::default_namespaced_with(self.client.clone(), &self.api_resource),
            (false, _) => Api::all_with(self.client.clone(), &self.api_resource),
        }
    }

    fn requeue(&self) -> Action {
        match self.period {
            Some(period) => Action::requeue(period),
            None => Action::await_change(),
        }
    }

    /// Send failure is logged but never fails the reconcile; the supervisor
    /// notices a lost session on its own.
    async fn emit(&self, object: &DynamicObject, event_type: ReconcileType) {
        let content = match serde_json::to_string(object) {
            Ok(content) => content,
            Err(err) => {
                eprintln!(
                    "{}",
                    format!("failed to serialize '{}': {err}", object.name_any()).red()
                );
                return;
            }
        };

        let event = ReconcileEventMessage {
            r#type: event_type.into(),
            content,
            resource_version: object.resource_version().unwrap_or_default(),
            reconciler_name: self.reconciler_name.clone(),
            reconciliation_request: Some(ReconciliationRequest {
                resource_name: object.name_any(),
                resource_namespace: object.namespace(),
            }),
        };
        if let Err(err) = self.session.send(ClientMessage::reconcile_event(event)).await {
            eprintln!("{}", format!("failed to send reconcile event: {err}").red());
        }
    }
}

async fn reconcile(
    object: Arc<DynamicObject>,
    ctx: Arc<ReconcilerContext>,
) -> Result<Action, WatchError> {
    if !ctx.enabled.load(Ordering::SeqCst) {
        // Keep looping while disabled; reconciliation resumes on enable.
        return Ok(ctx.requeue());
    }

    let name = object.name_any();
    let namespace = object.namespace();
    if let Some(want) = &ctx.namespace
        && namespace.as_deref() != Some(want.as_str())
    {
        return Ok(ctx.requeue());
    }

    let api = ctx.api_for(namespace.as_deref());
    let fresh = match api.get(&name).await {
        Ok(fresh) => fresh,
        Err(kube::Error::Api(err)) if err.code == 404 => return Ok(ctx.requeue()),
        Err(err) => return Err(err.into()),
    };

    let json = serde_json::to_value(&fresh).unwrap_or(serde_json::Value::Null);
    if !ctx.selector.fields.matches(&json) {
        return Ok(ctx.requeue());
    }

    if fresh.metadata.deletion_timestamp.is_some() {
        if has_finalizer(&fresh) {
            ctx.emit(&fresh, ReconcileType::Delete).await;
            let mut updated = fresh.clone();
            updated.finalizers_mut().retain(|f| f != FINALIZER);
            api.replace(&name, &PostParams::default(), &updated).await?;
        }
        return Ok(Action::await_change());
    }

    if !has_finalizer(&fresh) {
        let mut updated = fresh.clone();
        updated.finalizers_mut().push(FINALIZER.to_string());
        api.replace(&name, &PostParams::default(), &updated).await?;
    }

    ctx.emit(&fresh, ReconcileType::CreateOrUpdate).await;
    Ok(ctx.requeue())
}

fn has_finalizer(object: &DynamicObject) -> bool {
    object.finalizers().iter().any(|f| f == FINALIZER)
}

fn error_policy(
    object: Arc<DynamicObject>,
    error: &WatchError,
    _ctx: Arc<ReconcilerContext>,
) -> Action {
    eprintln!(
        "{}",
        format!("reconciliation of '{}' failed: {error}", object.name_any()).red()
    );
    Action::requeue(Duration::from_secs(5))
}
