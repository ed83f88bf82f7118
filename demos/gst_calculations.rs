//! GST calculation examples

use billing_core::{Discount, DocumentTotals, LineCalculation, TaxDescriptor};
use bigdecimal::BigDecimal;
use std::str::FromStr;

fn print_line(label: &str, line: &LineCalculation) {
    println!("  {}", label);
    println!("    Line Amount: ₹{}", line.line_amount);
    println!("    Discount:    ₹{}", line.discount_amount);
    println!("    Taxable:     ₹{}", line.taxable_amount);
    println!("    CGST ({}%):  ₹{}", line.rates.cgst, line.cgst_amount);
    println!("    SGST ({}%):  ₹{}", line.rates.sgst, line.sgst_amount);
    println!("    IGST ({}%):  ₹{}", line.rates.igst, line.igst_amount);
    println!("    CESS ({}%):  ₹{}", line.rates.cess, line.cess_amount);
    println!("    Line Total:  ₹{}", line.total_amount);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🧾 Billing Core - GST Calculation Examples\n");

    let gst18 = TaxDescriptor::new(BigDecimal::from(18));

    // 1. Same line, both supply types
    println!("🏢 Intra-state vs Inter-state:");
    let intra = LineCalculation::calculate(
        &BigDecimal::from(2),
        &BigDecimal::from(5000),
        &Discount::none(),
        Some(&gst18),
        false,
    )?;
    print_line("Intra-state (CGST + SGST)", &intra);

    let inter = LineCalculation::calculate(
        &BigDecimal::from(2),
        &BigDecimal::from(5000),
        &Discount::none(),
        Some(&gst18),
        true,
    )?;
    print_line("Inter-state (IGST only)", &inter);
    println!();

    // 2. Discounts come off before tax
    println!("🏷️ Percentage discount with rounding:");
    let discounted = LineCalculation::calculate(
        &BigDecimal::from(3),
        &BigDecimal::from_str("33.33")?,
        &Discount::percentage(BigDecimal::from(10)),
        Some(&gst18),
        false,
    )?;
    print_line("3 × ₹33.33 less 10%", &discounted);
    println!();

    // 3. Compensation cess on top of the 28% slab
    println!("🚗 Luxury slab with cess:");
    let luxury = TaxDescriptor::new(BigDecimal::from(28)).with_cess(BigDecimal::from(15));
    let car = LineCalculation::calculate(
        &BigDecimal::from(1),
        &BigDecimal::from(800000),
        &Discount::none(),
        Some(&luxury),
        true,
    )?;
    print_line("Vehicle", &car);
    println!();

    // 4. Multi-line document with shipping and round-off
    println!("🧾 Multi-item document:");
    let items = [
        ("Rice - 10kg", 2, "150", BigDecimal::from(0)),
        ("Coffee powder - 500g", 1, "399.50", BigDecimal::from(5)),
        ("Cooking oil - 1L", 3, "119.90", BigDecimal::from(12)),
        ("Consultation service", 1, "2000", BigDecimal::from(18)),
    ];

    let mut lines = Vec::new();
    for (i, (name, quantity, rate, slab)) in items.iter().enumerate() {
        let line = LineCalculation::calculate(
            &BigDecimal::from(*quantity),
            &BigDecimal::from_str(rate)?,
            &Discount::none(),
            Some(&TaxDescriptor::new(slab.clone())),
            false,
        )?;
        println!(
            "    {}. {} × {} @ ₹{} = ₹{} (GST {}%: ₹{})",
            i + 1,
            name,
            quantity,
            rate,
            line.taxable_amount,
            slab,
            line.total_tax
        );
        lines.push(line);
    }

    let totals = DocumentTotals::calculate(
        &lines,
        &Discount::fixed(BigDecimal::from(50)),
        &BigDecimal::from(40),
        &BigDecimal::from(0),
    )?;

    println!();
    println!("  Document Summary:");
    println!("    Subtotal:          ₹{}", totals.subtotal);
    println!("    Document Discount: ₹{}", totals.document_discount_amount);
    println!("    Taxable:           ₹{}", totals.taxable_amount);
    println!("    Total CGST:        ₹{}", totals.cgst_amount);
    println!("    Total SGST:        ₹{}", totals.sgst_amount);
    println!("    Shipping:          ₹{}", totals.shipping_charge);
    println!("    Round Off:         ₹{}", totals.round_off);
    println!("    Grand Total:       ₹{}", totals.total_amount);
    println!();

    // 5. Validation examples
    println!("✅ Validation:");
    let oversized = LineCalculation::calculate(
        &BigDecimal::from(1),
        &BigDecimal::from(50),
        &Discount::fixed(BigDecimal::from(60)),
        None,
        false,
    );
    match oversized {
        Ok(_) => println!("  ✓ Discount accepted"),
        Err(e) => println!("  ❌ {}", e),
    }

    let bad_slab = TaxDescriptor::new(BigDecimal::from(118));
    match bad_slab.validate() {
        Ok(()) => println!("  ✓ Valid slab"),
        Err(e) => println!("  ❌ {}", e),
    }

    println!("\n🎉 GST calculation examples completed successfully!");
    Ok(())
}
