use common::{AccountId, CouponId, Credits};
use criterion::{Criterion, criterion_group, criterion_main};
use purchase::{InMemoryNotificationSink, InMemoryReconciliationQueue, PurchaseOrchestrator};
use record_store::{InMemoryRecordStore, NewAccount, NewCoupon, RecordStore, StoreOperation};

type BenchOrchestrator =
    PurchaseOrchestrator<InMemoryRecordStore, InMemoryNotificationSink, InMemoryReconciliationQueue>;

async fn setup(buyer_credits: i64) -> (BenchOrchestrator, AccountId, CouponId) {
    let store = InMemoryRecordStore::new();
    let buyer = store
        .insert_account(
            NewAccount::new(Credits::new(buyer_credits).unwrap()).with_email("buyer@example.com"),
        )
        .await
        .unwrap();
    let seller = store
        .insert_account(NewAccount::new(Credits::zero()).with_email("seller@example.com"))
        .await
        .unwrap();
    let coupon = store
        .insert_coupon(NewCoupon::new(
            seller.id,
            "Bench coupon",
            "BENCH-1",
            Credits::new(20).unwrap(),
        ))
        .await
        .unwrap();
    let orchestrator = PurchaseOrchestrator::new(
        store,
        InMemoryNotificationSink::new(),
        InMemoryReconciliationQueue::new(),
    );
    (orchestrator, buyer.id, coupon.id)
}

fn bench_committed_purchase(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("purchase/committed", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (orchestrator, buyer, coupon) = setup(50).await;
                orchestrator.purchase(coupon, buyer).await.unwrap();
            });
        });
    });
}

fn bench_rejected_purchase(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (orchestrator, buyer, coupon) = rt.block_on(setup(5));

    c.bench_function("purchase/insufficient_funds", |b| {
        b.iter(|| {
            rt.block_on(async {
                orchestrator.purchase(coupon, buyer).await.unwrap_err();
            });
        });
    });
}

fn bench_full_rollback(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("purchase/rollback_at_ledger", |b| {
        b.iter(|| {
            rt.block_on(async {
                let (orchestrator, buyer, coupon) = setup(50).await;
                orchestrator
                    .store()
                    .fail_on(StoreOperation::InsertLedgerEntry);
                orchestrator.purchase(coupon, buyer).await.unwrap_err();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_committed_purchase,
    bench_rejected_purchase,
    bench_full_rollback
);
criterion_main!(benches);
