//! End-to-end billing flow: catalogue, invoice, payment, credit note

use billing_core::{
    telemetry, BillingEngine, CreditNoteReason, Customer, DocumentDraft, DocumentType,
    EngineConfig, InventoryTransactionType, LineItemInput, MemoryStore, PaymentMeta, PaymentMode,
    Product, StockAdjustment, TaxDescriptor, TaxRate, TaxRateId, Tenant,
};
use bigdecimal::BigDecimal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = EngineConfig::load()?;
    telemetry::init(&config);

    println!("🧾 Billing Core - Invoice Flow Example\n");

    let engine = BillingEngine::new(MemoryStore::new(), config);

    // 1. Tenant, customer and catalogue
    println!("🏪 Setting up the shop...");
    let tenant = engine
        .register_tenant(Tenant::new("Acme Traders".to_string(), "KA".to_string()))
        .await?;

    let mut customer = Customer::new(tenant.id, "Ravi Kumar".to_string(), BigDecimal::from(500));
    customer.state_code = Some("KA".to_string());
    let customer = engine.register_customer(customer).await?;

    let gst5 = engine
        .register_tax_rate(TaxRate {
            id: TaxRateId::new(),
            tenant_id: tenant.id,
            name: "GST 5%".to_string(),
            descriptor: TaxDescriptor::new(BigDecimal::from(5)),
        })
        .await?;

    let mut rice = Product::new(tenant.id, "Basmati Rice 1kg".to_string(), BigDecimal::from(120));
    rice.hsn_code = Some("1006".to_string());
    rice.tax_rate_id = Some(gst5.id);
    rice.track_inventory = true;
    rice.opening_stock = BigDecimal::from(20);
    let rice = engine.register_product(rice).await?;

    println!("  ✓ Tenant: {} ({})", tenant.name, tenant.state_code);
    println!("  ✓ Customer: {} (opening ₹{})", customer.name, customer.opening_balance);
    println!("  ✓ Product: {} - {} in stock", rice.name, rice.stock_quantity);
    println!();

    // 2. Restock
    let mut delivery = StockAdjustment::new(BigDecimal::from(10), InventoryTransactionType::Purchase);
    delivery.notes = Some("Supplier delivery".to_string());
    let rice_now = engine.adjust_stock(tenant.id, rice.id, delivery).await?;
    println!("📦 Received stock: {} on hand\n", rice_now.stock_quantity);

    // 3. Invoice
    println!("🧾 Creating invoice...");
    let invoice = engine
        .create_from_draft(
            DocumentType::Invoice,
            tenant.id,
            DocumentDraft::for_customer(
                customer.id,
                vec![
                    LineItemInput::product(rice.id, BigDecimal::from(4)),
                    LineItemInput::custom("Home delivery", BigDecimal::from(1), BigDecimal::from(60)),
                ],
            ),
        )
        .await?;
    let invoice = engine.mark_sent(tenant.id, invoice.id).await?;

    for line in &invoice.line_items {
        println!(
            "    {}. {} × {} @ ₹{} = ₹{}",
            line.position, line.name, line.quantity, line.rate, line.amounts.total_amount
        );
    }
    println!("  Number:      {}", invoice.number);
    println!("  CGST:        ₹{}", invoice.totals.cgst_amount);
    println!("  SGST:        ₹{}", invoice.totals.sgst_amount);
    println!("  Round Off:   ₹{}", invoice.totals.round_off);
    println!("  Grand Total: ₹{}", invoice.totals.total_amount);
    println!();

    // 4. Partial payment
    let payment = engine
        .record_payment(
            tenant.id,
            invoice.id,
            BigDecimal::from(300),
            PaymentMode::Upi,
            PaymentMeta {
                reference: Some("UPI-8841".to_string()),
                ..Default::default()
            },
        )
        .await?;
    let invoice = engine.get_document(tenant.id, invoice.id).await?;
    println!("💰 Payment {} of ₹{}", payment.number, payment.amount);
    println!(
        "  Invoice is {:?}, ₹{} still due\n",
        invoice.payment_status, invoice.balance_due
    );

    // 5. One bag comes back
    let credit_note = engine
        .create_from_draft(
            DocumentType::CreditNote,
            tenant.id,
            DocumentDraft::for_customer(
                customer.id,
                vec![LineItemInput::product(rice.id, BigDecimal::from(1))],
            )
            .with_credit_note(CreditNoteReason::Return, Some(invoice.id)),
        )
        .await?;
    engine
        .apply_credit_note(tenant.id, credit_note.id, invoice.id, None)
        .await?;
    println!(
        "↩️ Credit note {} for ₹{} applied",
        credit_note.number, credit_note.totals.total_amount
    );

    // 6. Where everything stands
    let invoice = engine.get_document(tenant.id, invoice.id).await?;
    let balance = engine.get_customer_balance(tenant.id, customer.id).await?;
    let report = engine.verify_stock_chain(tenant.id, rice.id).await?;

    println!();
    println!("📊 Summary:");
    println!("  Invoice balance due: ₹{}", invoice.balance_due);
    println!("  Customer balance:    ₹{}", balance);
    println!(
        "  Stock: {} on hand, {} log entries, chain {}",
        report.recorded_stock,
        report.entries,
        if report.is_consistent() { "consistent" } else { "DRIFTED" }
    );

    println!("\n🎉 Invoice flow completed successfully!");
    Ok(())
}
