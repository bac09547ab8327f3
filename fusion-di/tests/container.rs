use fusion_di::bean::{BeanPtr, FnBean};
use fusion_di::bean_type::{BeanType, Supertype};
use fusion_di::configuration::{Configuration, ConfigurationSource};
use fusion_di::container::{Container, ContainerBuilder, ContainerConfiguration};
use fusion_di::event::{FnListener, Start, Stop};
use fusion_di::fusion_module;
use fusion_di::instance::Instance;
use fusion_di::module::FusionModule;
use fusion_di::scope::{ProxyTarget, APPLICATION};
use fusion_di::{upcast, BeanError};
use std::env;
use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

fn builder() -> ContainerBuilder {
    ContainerBuilder::new()
        .with_configuration(ContainerConfiguration::default().with_auto_discovery(false))
}

type Log = Arc<Mutex<Vec<&'static str>>>;

#[test]
fn should_construct_application_bean_once_for_concurrent_lookups() {
    const THREADS: usize = 8;

    struct Singleton;

    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let container = builder()
        .register_bean(
            FnBean::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::yield_now();
                Ok(Arc::new(Singleton))
            })
            .with_scope(APPLICATION),
        )
        .start()
        .unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let container = container.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                container.lookup::<Singleton>().unwrap().instance().unwrap()
            })
        })
        .collect();

    let instances: Vec<_> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert!(instances
        .iter()
        .all(|instance| Arc::ptr_eq(instance, &instances[0])));
}

struct NodeA {
    b: Instance<NodeB>,
}

struct NodeB {
    a: Instance<NodeA>,
}

fn node_graph() -> Container {
    builder()
        .register_bean(
            FnBean::new(|container, dependents| {
                Ok(Arc::new(NodeA {
                    b: container.lookup_into::<NodeB>(dependents)?,
                }))
            })
            .with_scope(APPLICATION),
        )
        .register_bean(
            FnBean::new(|container, dependents| {
                Ok(Arc::new(NodeB {
                    a: container.lookup_into::<NodeA>(dependents)?,
                }))
            })
            .with_scope(APPLICATION),
        )
        .start()
        .unwrap()
}

#[test]
fn should_resolve_mutually_dependent_beans_accessed_lazily() {
    let container = node_graph();

    let a = container.lookup::<NodeA>().unwrap().instance().unwrap();
    let b = a.b.instance().unwrap();

    assert!(Arc::ptr_eq(&b.a.instance().unwrap(), &a));
}

#[test]
fn should_release_mutually_dependent_beans_on_close() {
    let container = node_graph();
    let a = container.lookup::<NodeA>().unwrap().instance().unwrap();
    let b = a.b.instance().unwrap();
    let (weak_a, weak_b) = (Arc::downgrade(&a), Arc::downgrade(&b));
    drop((a, b));

    container.close().unwrap();

    assert!(weak_a.upgrade().is_none());
    assert!(weak_b.upgrade().is_none());
}

#[derive(Debug, thiserror::Error)]
#[error("not available yet")]
struct Unavailable;

#[test]
fn should_retry_failed_construction_through_held_instance() {
    struct Flaky;

    let attempts = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let (attempt_counter, destroy_counter) = (attempts.clone(), destroyed.clone());
    let container = builder()
        .register_bean(
            FnBean::new(move |_, _| {
                if attempt_counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(BeanError::factory(Unavailable))
                } else {
                    Ok(Arc::new(Flaky))
                }
            })
            .with_scope(APPLICATION)
            .with_destroy(move |_, _| {
                destroy_counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }),
        )
        .start()
        .unwrap();

    let held = container.lookup::<Flaky>().unwrap();
    assert!(matches!(held.instance(), Err(BeanError::Factory(_))));

    let via_held = held.instance().unwrap();
    let via_lookup = container.lookup::<Flaky>().unwrap().instance().unwrap();

    assert!(Arc::ptr_eq(&via_held, &via_lookup));
    assert_eq!(attempts.load(Ordering::SeqCst), 2);

    container.close().unwrap();
    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
}

#[test]
fn should_not_construct_application_bean_after_close() {
    struct Late;

    let created = Arc::new(AtomicUsize::new(0));
    let counter = created.clone();
    let container = builder()
        .register_bean(
            FnBean::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Late))
            })
            .with_scope(APPLICATION),
        )
        .start()
        .unwrap();

    let held = container.lookup::<Late>().unwrap();
    container.close().unwrap();

    assert!(matches!(held.instance(), Err(BeanError::ContainerClosed)));
    assert_eq!(created.load(Ordering::SeqCst), 0);
}

#[test]
fn should_report_cycle_dereferenced_during_construction() {
    struct EagerA;

    struct EagerB;

    let container = builder()
        .register_bean(
            FnBean::new(|container, dependents| {
                container.lookup_into::<EagerB>(dependents)?.instance()?;
                Ok(Arc::new(EagerA))
            })
            .with_scope(APPLICATION),
        )
        .register_bean(
            FnBean::new(|container, dependents| {
                container.lookup_into::<EagerA>(dependents)?.instance()?;
                Ok(Arc::new(EagerB))
            })
            .with_scope(APPLICATION),
        )
        .start()
        .unwrap();

    assert!(matches!(
        container.lookup::<EagerA>().unwrap().instance(),
        Err(BeanError::DependencyCycle(_))
    ));
}

trait Greeter: Send + Sync {
    fn greet(&self) -> Result<String, BeanError>;
}

struct EnglishGreeter {
    name: Arc<NameProvider>,
}

impl Greeter for EnglishGreeter {
    fn greet(&self) -> Result<String, BeanError> {
        Ok(format!("hello {}", self.name.name))
    }
}

struct GreeterProxy {
    target: ProxyTarget,
}

impl Greeter for GreeterProxy {
    fn greet(&self) -> Result<String, BeanError> {
        self.target.resolve::<dyn Greeter>()?.greet()
    }
}

struct NameProvider {
    name: String,
    greeter: Arc<dyn Greeter>,
}

#[test]
fn should_break_eager_cycle_with_proxy() {
    let container = builder()
        .register_bean(
            FnBean::<dyn Greeter>::new(|container, dependents| {
                let name = container.lookup_into::<NameProvider>(dependents)?.instance()?;
                Ok(Arc::new(EnglishGreeter { name }) as Arc<dyn Greeter>)
            })
            .with_scope(APPLICATION)
            .with_proxy(|target| Arc::new(GreeterProxy { target }) as Arc<dyn Greeter>),
        )
        .register_bean(
            FnBean::new(|container, dependents| {
                let greeter = container.lookup_into::<dyn Greeter>(dependents)?.instance()?;
                Ok(Arc::new(NameProvider {
                    name: "world".to_string(),
                    greeter,
                }))
            })
            .with_scope(APPLICATION),
        )
        .start()
        .unwrap();

    let provider = container.lookup::<NameProvider>().unwrap().instance().unwrap();

    assert_eq!(provider.greeter.greet().unwrap(), "hello world");
}

struct Dependency(&'static str);

fn recording_bean(name: &'static str, log: &Log) -> BeanPtr {
    let log = log.clone();
    Arc::new(
        FnBean::new(move |_, _| Ok(Arc::new(Dependency(name))))
            .with_type(BeanType::of::<Dependency>().with_argument(BeanType::of::<&'static str>()))
            .with_priority(name.len() as i32)
            .with_destroy(move |_, dependency: Arc<Dependency>| {
                log.lock().unwrap().push(dependency.0);
                Ok(())
            }),
    )
}

#[test]
fn should_release_looked_up_beans_in_reverse_order() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let dependency_type =
        BeanType::of::<Dependency>().with_argument(BeanType::of::<&'static str>());

    let container = builder()
        .register_beans(["zzz", "x", "yy"].map(|name| recording_bean(name, &log)))
        .start()
        .unwrap();

    let best = container
        .lookup_type::<Dependency>(&dependency_type)
        .unwrap()
        .instance()
        .unwrap();
    assert_eq!(best.0, "x");

    let ordered = container
        .lookups_type_with(&dependency_type, |values: Vec<Arc<Dependency>>| {
            values.iter().map(|value| value.0).collect::<Vec<_>>()
        })
        .unwrap();
    assert_eq!(*ordered.instance().unwrap(), vec!["x", "yy", "zzz"]);

    ordered.close().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["zzz", "yy", "x"]);
}

#[test]
fn should_close_dependents_z_y_x() {
    struct X;
    struct Y;
    struct Z;
    struct Root;

    let log: Log = Arc::new(Mutex::new(vec![]));

    fn leaf<T: Send + Sync + 'static>(value: fn() -> T, name: &'static str, log: &Log) -> BeanPtr {
        let log = log.clone();
        Arc::new(
            FnBean::new(move |_, _| Ok(Arc::new(value()))).with_destroy(move |_, _| {
                log.lock().unwrap().push(name);
                Ok(())
            }),
        )
    }

    let container = builder()
        .register_beans([leaf(|| X, "x", &log), leaf(|| Y, "y", &log), leaf(|| Z, "z", &log)])
        .register_bean(FnBean::new(|container, dependents| {
            container.lookup_into::<X>(dependents)?;
            container.lookup_into::<Y>(dependents)?;
            container.lookup_into::<Z>(dependents)?;
            Ok(Arc::new(Root))
        }))
        .start()
        .unwrap();

    let root = container.lookup::<Root>().unwrap();
    root.close().unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["z", "y", "x"]);
}

trait Plugin: Send + Sync {
    fn priority(&self) -> i32;
}

struct PrioritizedPlugin(i32);

impl Plugin for PrioritizedPlugin {
    fn priority(&self) -> i32 {
        self.0
    }
}

#[test]
fn should_order_lookups_by_priority() {
    let plugins = [30, 10, 20].map(|priority| {
        Arc::new(
            FnBean::new(move |_, _| Ok(Arc::new(PrioritizedPlugin(priority))))
                .with_priority(priority)
                .with_supertype(Supertype::new(
                    BeanType::of::<dyn Plugin>(),
                    upcast!(PrioritizedPlugin => dyn Plugin),
                )),
        ) as BeanPtr
    });

    let container = builder().register_beans(plugins).start().unwrap();

    let priorities: Vec<_> = container
        .lookups::<dyn Plugin>()
        .unwrap()
        .instance()
        .unwrap()
        .iter()
        .map(|plugin| plugin.priority())
        .collect();

    assert_eq!(priorities, vec![10, 20, 30]);
    assert_eq!(
        container
            .lookup::<dyn Plugin>()
            .unwrap()
            .instance()
            .unwrap()
            .priority(),
        10
    );
}

#[test]
fn should_dispatch_start_by_priority_only_to_start_listeners() {
    let log: Log = Arc::new(Mutex::new(vec![]));
    let late = log.clone();
    let early = log.clone();
    let stop = log.clone();

    let container = builder()
        .register_listener(
            FnListener::new(move |_, _: &Start| {
                late.lock().unwrap().push("2000");
                Ok(())
            })
            .with_priority(2000),
        )
        .register_listener(
            FnListener::new(move |_, _: &Start| {
                early.lock().unwrap().push("1000");
                Ok(())
            })
            .with_priority(1000),
        )
        .register_listener(FnListener::new(move |_, _: &Stop| {
            stop.lock().unwrap().push("stop");
            Ok(())
        }))
        .start()
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["1000", "2000"]);

    container.close().unwrap();
    assert_eq!(*log.lock().unwrap(), vec!["1000", "2000", "stop"]);
}

#[derive(Debug, thiserror::Error)]
#[error("{0} failed to close")]
struct DestroyFailure(&'static str);

#[test]
fn should_aggregate_teardown_failures() {
    struct First;
    struct Second;
    struct Healthy;

    let healthy_destroyed = Arc::new(AtomicUsize::new(0));
    let counter = healthy_destroyed.clone();

    let container = builder()
        .register_bean(
            FnBean::new(|_, _| Ok(Arc::new(First)))
                .with_scope(APPLICATION)
                .with_destroy(|_, _| Err(BeanError::factory(DestroyFailure("first")))),
        )
        .register_bean(
            FnBean::new(|_, _| Ok(Arc::new(Healthy)))
                .with_scope(APPLICATION)
                .with_destroy(move |_, _| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }),
        )
        .register_bean(
            FnBean::new(|_, _| Ok(Arc::new(Second)))
                .with_scope(APPLICATION)
                .with_destroy(|_, _| Err(BeanError::factory(DestroyFailure("second")))),
        )
        .start()
        .unwrap();

    container.lookup::<First>().unwrap().instance().unwrap();
    container.lookup::<Healthy>().unwrap().instance().unwrap();
    container.lookup::<Second>().unwrap().instance().unwrap();

    let error = container.close().unwrap_err();
    let mut causes: Vec<_> = error.causes().iter().map(ToString::to_string).collect();
    causes.sort();

    assert_eq!(healthy_destroyed.load(Ordering::SeqCst), 1);
    assert_eq!(causes.len(), 2);
    assert!(causes[0].contains("first failed to close"));
    assert!(causes[1].contains("second failed to close"));
    assert!(container.is_closed());
}

struct CustomSource;

impl ConfigurationSource for CustomSource {
    fn get(&self, key: &str) -> Option<String> {
        (key == "FUSION_DI_FALLBACK_KEY").then(|| "custom".to_string())
    }
}

#[test]
fn should_prefer_custom_configuration_source() {
    env::set_var("FUSION_DI_FALLBACK_KEY", "env-value");
    env::set_var("FUSION_DI_FALLBACK_ONLY_ENV", "env-only");

    let container = builder()
        .register_bean(FnBean::<dyn ConfigurationSource>::new(|_, _| {
            Ok(Arc::new(CustomSource) as Arc<dyn ConfigurationSource>)
        }))
        .start()
        .unwrap();

    let configuration = container.lookup::<Configuration>().unwrap().instance().unwrap();

    assert_eq!(
        configuration.get("FUSION_DI_FALLBACK_KEY").as_deref(),
        Some("custom")
    );
    assert_eq!(
        configuration.get("FUSION_DI_FALLBACK_ONLY_ENV").as_deref(),
        Some("env-only")
    );
}

struct Bean1 {
    bean2: Arc<Bean2>,
}

impl Display for Bean1 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "bean1[{}]", self.bean2)
    }
}

struct Bean2;

impl Display for Bean2 {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "bean2[]")
    }
}

fn simple_graph() -> Container {
    builder()
        .register_bean(FnBean::new(|container, dependents| {
            let bean2 = container.lookup_into::<Bean2>(dependents)?.instance()?;
            Ok(Arc::new(Bean1 { bean2 }))
        }))
        .register_bean(FnBean::new(|_, _| Ok(Arc::new(Bean2))))
        .start()
        .unwrap()
}

#[test]
fn should_resolve_simple_graph() {
    let bean1 = simple_graph().lookup::<Bean1>().unwrap().instance().unwrap();

    assert_eq!(bean1.to_string(), "bean1[bean2[]]");
}

#[test]
fn should_resolve_missing_bean_to_null() {
    struct Missing;

    let container = simple_graph();
    let missing = container.lookup::<Missing>().unwrap();

    assert!(missing.optional().unwrap().is_none());
    assert!(matches!(
        missing.instance(),
        Err(BeanError::NullInstance(_))
    ));
    assert!(container.lookup_optional::<Missing>().unwrap().is_none());
    assert!(container
        .lookups::<Missing>()
        .unwrap()
        .instance()
        .unwrap()
        .is_empty());
}

struct Discovered;

struct DiscoveryModule;

impl FusionModule for DiscoveryModule {
    fn beans(&self) -> Vec<BeanPtr> {
        vec![Arc::new(
            FnBean::new(|_, _| Ok(Arc::new(Discovered))).with_scope(APPLICATION),
        )]
    }
}

fusion_module!(DiscoveryModule);

#[test]
fn should_discover_registered_modules() {
    let discovered = ContainerBuilder::new().start().unwrap();
    let disabled = builder().start().unwrap();

    assert!(discovered.lookup_optional::<Discovered>().unwrap().is_some());
    assert!(disabled.lookup_optional::<Discovered>().unwrap().is_none());
}
