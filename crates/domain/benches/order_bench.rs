use criterion::{Criterion, black_box, criterion_group, criterion_main};
use domain::{
    Actor, Address, Aggregate, FulfillmentStatus, LineItem, Money, NewOrder, Order, OrderEvent,
    OrderId, OrderNumber, PaymentMethod, PricingPolicy, UserId,
};
use rust_decimal::Decimal;

fn basket(lines: usize) -> Vec<LineItem> {
    (0..lines)
        .map(|i| {
            let weight = (i % 3 == 0).then(|| Decimal::new(125, 2));
            LineItem::snapshot(
                format!("SKU-{i:04}"),
                format!("Item {i}"),
                None,
                Money::from_cents(199 + i as i64),
                1 + (i % 4) as u32,
                weight,
            )
            .unwrap()
        })
        .collect()
}

fn address() -> Address {
    Address {
        full_name: "Bench Shopper".to_string(),
        street: "1 Loop Rd".to_string(),
        apartment: None,
        city: "Cupertino".to_string(),
        state: "CA".to_string(),
        zip_code: "95014".to_string(),
        country: "US".to_string(),
        phone: None,
    }
}

fn lifecycle_events() -> Vec<OrderEvent> {
    let items = basket(20);
    let totals = PricingPolicy::default()
        .price(&items, Money::from_cents(300), Money::zero())
        .unwrap();
    let new = NewOrder {
        order_id: OrderId::new(),
        order_number: OrderNumber::new("ORD-0-0000"),
        user_id: UserId::new(),
        items,
        totals,
        shipping_address: address(),
        billing_address: None,
        payment_method: PaymentMethod::OfflineCardOtc,
        notes: None,
        actor: Actor::System,
    };

    let mut order = Order::default();
    let mut log = Vec::new();
    let mut run = |order: &mut Order, events: Vec<OrderEvent>| {
        log.extend(events.iter().cloned());
        order.apply_events(events);
    };

    let events = order.place(new).unwrap();
    run(&mut order, events);
    for _ in 0..5 {
        let events = order
            .receive_payment(
                PaymentMethod::OfflineCardOtc,
                Money::from_cents(500),
                None,
                vec![],
                Actor::System,
            )
            .unwrap();
        run(&mut order, events);
    }
    let events = order
        .settle_in_full(PaymentMethod::ProcessorCard, None, None, true, Actor::Processor)
        .unwrap();
    run(&mut order, events);
    for to in [
        FulfillmentStatus::Processing,
        FulfillmentStatus::Shipped,
        FulfillmentStatus::Delivered,
    ] {
        let events = order.advance(to, None, None, Actor::System).unwrap();
        run(&mut order, events);
    }
    log
}

fn bench_pricing(c: &mut Criterion) {
    let policy = PricingPolicy::default();
    let items = basket(50);

    c.bench_function("domain/price_50_lines", |b| {
        b.iter(|| {
            policy
                .price(black_box(&items), Money::from_cents(200), Money::from_cents(100))
                .unwrap()
        });
    });
}

fn bench_replay(c: &mut Criterion) {
    let events = lifecycle_events();

    c.bench_function("domain/replay_full_lifecycle", |b| {
        b.iter(|| {
            let mut order = Order::default();
            order.apply_events(black_box(events.clone()));
            order
        });
    });
}

fn bench_document_round_trip(c: &mut Criterion) {
    let mut order = Order::default();
    order.apply_events(lifecycle_events());

    c.bench_function("domain/document_round_trip", |b| {
        b.iter(|| {
            let json = serde_json::to_vec(black_box(&order)).unwrap();
            serde_json::from_slice::<Order>(&json).unwrap()
        });
    });
}

criterion_group!(benches, bench_pricing, bench_replay, bench_document_round_trip);
criterion_main!(benches);
