use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use weaver_aop::prelude::*;
use weaver_aop::WeaverConfig;

// ==================== 领域模型 ====================

#[derive(Debug, Clone)]
pub struct Order {
    pub id: u64,
    pub customer: String,
    pub amount: i64,
}

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("order amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("order {0} not found")]
    NotFound(u64),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

// ==================== 业务服务 ====================

/// 订单服务接口 - 代理通过它织入横切逻辑
#[aop_interface]
pub trait OrderService: Send + Sync {
    fn create_order(&self, customer: String, amount: i64) -> Result<Order, OrderError>;
    fn find_order(&self, id: u64) -> Result<Order, OrderError>;
}

/// 内存实现
pub struct InMemoryOrderService {
    orders: Mutex<Vec<Order>>,
    next_id: AtomicU64,
}

impl OrderService for InMemoryOrderService {
    fn create_order(&self, customer: String, amount: i64) -> Result<Order, OrderError> {
        let order = Order {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            customer,
            amount,
        };
        self.orders.lock().push(order.clone());
        Ok(order)
    }

    fn find_order(&self, id: u64) -> Result<Order, OrderError> {
        self.orders
            .lock()
            .iter()
            .find(|order| order.id == id)
            .cloned()
            .ok_or(OrderError::NotFound(id))
    }
}

#[aop_class(interfaces(OrderService))]
impl InMemoryOrderService {
    pub fn new() -> Self {
        Self {
            orders: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// 子类代理可以拦截的自身方法
    pub fn order_count(&self) -> anyhow::Result<usize> {
        Ok(self.orders.lock().len())
    }
}

impl Default for InMemoryOrderService {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== 通知 ====================

/// 校验：金额必须为正
fn validation_advice() -> Advice {
    Advice::before(|jp: &JoinPoint<'_>| -> anyhow::Result<()> {
        let amount = *jp.args().get::<i64>(1)?;
        if amount <= 0 {
            return Err(OrderError::InvalidAmount(amount).into());
        }
        Ok(())
    })
}

/// 审计：记录成功创建的订单
fn audit_advice() -> Advice {
    Advice::after_returning(|value: &ReturnValue, jp: &JoinPoint<'_>| -> anyhow::Result<()> {
        if let Some(order) = value.downcast_ref::<Order>() {
            info!(
                order_id = order.id,
                customer = %order.customer,
                method = %jp.signature(),
                "📝 Audit: order recorded"
            );
        }
        Ok(())
    })
}

fn find_config() -> &'static str {
    ["demos/order-demo/weaver.toml", "weaver.toml"]
        .into_iter()
        .find(|path| std::path::Path::new(path).exists())
        .unwrap_or("weaver.toml")
}

// ==================== 主程序 ====================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = WeaverConfig::load(find_config())?;
    config.logging.clone().init()?;

    println!("\n╔════════════════════════════════════════════════════╗");
    println!("║          Weaver AOP - Order Service Demo           ║");
    println!("╚════════════════════════════════════════════════════╝\n");

    let registry = Arc::new(AdvisorAdapterRegistry::new());
    let monitor = Arc::new(PerformanceMonitorInterceptor::new(Duration::from_millis(50)));

    // 通知按注册顺序执行：日志 → 性能 → 校验 → 审计
    let mut factory = ProxyFactory::from_properties(&config.aop, Arc::clone(&registry));
    factory
        .set_class_target(Arc::new(InMemoryOrderService::new()))?
        .add_advice(TracingInterceptor::new().with_args().into_advice())?
        .add_advice(Advice::Around(monitor.clone()))?
        .add_advisor(Advisor::new(
            Arc::new(NameMatchMethodPointcut::new(["create_order"])?),
            validation_advice(),
        ))?
        .add_advisor(Advisor::new(
            Arc::new(ExpressionPointcut::new("execution(* OrderService.create_*(..))")),
            audit_advice(),
        ))?
        .add_advice(ErrorLoggingAdvice.into_advice())?;
    factory.set_frozen(true);

    let orders: OrderServiceProxy = factory.proxy()?;
    info!(strategy = %orders.aop_proxy().strategy(), "Order service proxy ready");

    // 并发调用方共享同一个代理
    let mut handles = Vec::new();
    for caller in 0..4i64 {
        let orders = orders.clone();
        handles.push(tokio::task::spawn_blocking(
            move || -> Result<Vec<Order>, OrderError> {
                (1..=3)
                    .map(|i| orders.create_order(format!("customer-{caller}"), i * 10 + caller))
                    .collect()
            },
        ));
    }
    for handle in handles {
        let placed = handle.await??;
        println!("🛒 Placed {} order(s) for {}", placed.len(), placed[0].customer);
    }

    // 校验失败：调用方拿到原始错误类型
    match orders.create_order("mallory".to_string(), -5) {
        Err(OrderError::InvalidAmount(amount)) => {
            println!("🚫 Rejected order with amount {amount}")
        }
        other => warn!("Unexpected result: {:?}", other),
    }

    let first = orders.find_order(1)?;
    println!("🔎 Found order #{} ({} → {})", first.id, first.customer, first.amount);
    if let Err(err) = orders.find_order(999) {
        println!("❓ {err}");
    }

    if let Some(stats) = monitor.stats("OrderService::create_order") {
        println!(
            "⏱️  create_order: {} call(s), max {:?}, {} slow",
            stats.calls, stats.max, stats.slow_calls
        );
    }

    // 子类代理：同时暴露接口方法和类型自身的方法
    let mut class_factory = ProxyFactory::with_registry(Arc::clone(&registry));
    class_factory
        .set_class_target(Arc::new(InMemoryOrderService::new()))?
        .set_proxy_target_class(true)?
        .add_advice(TracingInterceptor::new().with_result().into_advice())?;
    let proxy = class_factory.get_proxy()?;
    let class_view = InMemoryOrderServiceProxy::from_proxy(Arc::clone(&proxy))?;
    let interface_view = OrderServiceProxy::from_proxy(proxy)?;
    interface_view.create_order("zoe".to_string(), 42)?;
    println!(
        "🧬 {} proxy holds {} order(s)",
        class_view.aop_proxy().strategy(),
        class_view.order_count()?
    );

    // 自动代理：按名称模式决定是否包装
    let mut auto_proxy = AutoProxyCreator::from_properties(&config.aop, registry)?;
    auto_proxy.add_advisor(Advisor::for_all(TracingInterceptor::new().into_advice()))?;
    for name in ["orderService", "orderRepository"] {
        let source = TargetSource::class(Arc::new(InMemoryOrderService::new()));
        match auto_proxy.wrap_if_necessary(name, source)? {
            Some(proxy) => {
                let service = OrderServiceProxy::from_proxy(proxy)?;
                service.create_order("auto".to_string(), 1)?;
                println!("✨ '{name}' was wrapped automatically");
            }
            None => println!("➖ '{name}' left unproxied"),
        }
    }

    println!("\n✅ Demo finished");
    Ok(())
}
