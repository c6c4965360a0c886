//! Extraction instruction templates, keyed by document type.
//!
//! Every template follows the same contract with the model: map a fixed set
//! of standardized keys to values copied verbatim from the page, omit keys
//! that are not on the page, and answer with a single JSON object only.
//!
//! Dispatch is a plain lookup table ([`SPECIALIZED_TYPES`]) with the generic
//! template as its default entry, so the set of supported types can be
//! audited in one place.

use std::borrow::Cow;

/// Sentinel label meaning "classified, but not one of the known families".
///
/// The generic template is used as-is for this label (no substitution).
pub const OTHER_DOCUMENT_TYPE: &str = "Other";

/// Phrase in [`GENERIC_TEMPLATE`] replaced by the caller's label for
/// unrecognized document types.
const GENERIC_SUBJECT: &str = "a page from a tax form";

/// Fallback template for "Other" and for any label without a specialized entry.
pub const GENERIC_TEMPLATE: &str = r#"Analyze the provided image, which could be a page from a tax form (like W-2, 1099-INT, 1099-DIV, 1099-NEC), a receipt, an invoice, or a financial statement (like a P&L).
Identify and extract key information relevant for tax preparation.

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears on the document, including currency symbols, formatting, and full text where appropriate.
If a specific piece of information corresponding to a key is not found on this page, OMIT the key entirely from the JSON output. Do not include keys with null or empty values.

Attempt to determine the DocumentType first from this list: "W-2", "1099-NEC", "1099-INT", "1099-DIV", "1099-MISC", "Profit and Loss Statement", "Balance Sheet", "Cash Flow Statement", "Invoice", "Receipt", "Bank Statement", "Insurance Policy", "Other".

Possible Standardized Keys:
- DocumentType, TaxYear
- EmployerName, EmployerAddress, EmployerEIN
- EmployeeName, EmployeeAddress, EmployeeSSN
- WagesTipsOtherComp, FederalIncomeTaxWithheld, SocialSecurityWages, SocialSecurityTaxWithheld, MedicareWagesAndTips, MedicareTaxWithheld
- StateName, StateEmployerID, StateWagesTipsEtc, StateIncomeTax
- LocalWagesTipsEtc, LocalIncomeTax, LocalityName
- PayerName, PayerTIN, RecipientName, RecipientTIN
- InterestIncome, EarlyWithdrawalPenalty, InterestOnUSTreasuryObligations
- TotalOrdinaryDividends, QualifiedDividends, TotalCapitalGainDistrib, Section1202Gain, NondividendDistributions, ForeignTaxPaid
- NonemployeeCompensation
- VendorName, TransactionDate, TotalAmount, TaxAmount, ExpenseCategory, Description
- ReportingPeriodStartDate, ReportingPeriodEndDate, TotalRevenue, CostOfGoodsSold, GrossProfit, TotalOperatingExpenses, NetIncomeLoss
- AccountNumber, PolicyNumber, PolicyPeriod, NamedInsured(s)
- Other relevant identifiers or amounts.

The response MUST contain ONLY the JSON object and nothing else."#;

const W2_TEMPLATE: &str = r#"Analyze the provided image, which is confirmed to be a page from a W-2 form.
Identify and extract information relevant to Form W-2.

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears on the document, including formatting.
If a specific piece of information corresponding to a key is not found on this page, OMIT the key entirely from the JSON output.

Standardized Keys for W-2:
- DocumentType: (Should be "W-2")
- TaxYear
- EmployerName
- EmployerAddress
- EmployerEIN
- EmployeeName
- EmployeeAddress
- EmployeeSSN
- WagesTipsOtherComp: (Box 1)
- FederalIncomeTaxWithheld: (Box 2)
- SocialSecurityWages: (Box 3)
- SocialSecurityTaxWithheld: (Box 4)
- MedicareWagesAndTips: (Box 5)
- MedicareTaxWithheld: (Box 6)
- SocialSecurityTips: (Box 7)
- AllocatedTips: (Box 8)
- DependentCareBenefits: (Box 10)
- NonqualifiedPlans: (Box 11)
- StatutoryEmployee: (Box 13 Checkbox - return true/false or value if indicated)
- RetirementPlan: (Box 13 Checkbox - return true/false or value if indicated)
- ThirdPartySickPay: (Box 13 Checkbox - return true/false or value if indicated)
- OtherBox12CodesAndAmounts: (Box 12 a-d - Extract Code and Amount, e.g., {"D": "1500.00", "DD": "5000.00"})
- OtherBox14Items: (Box 14 - Extract Description and Amount, e.g., {"CASDI": "123.45"})
- StateName: (Box 15 State)
- StateEmployerID: (Box 15 Employer's state ID number)
- StateWagesTipsEtc: (Box 16)
- StateIncomeTax: (Box 17)
- LocalWagesTipsEtc: (Box 18)
- LocalIncomeTax: (Box 19)
- LocalityName: (Box 20)

The response MUST contain ONLY the JSON object and nothing else."#;

const PROFIT_AND_LOSS_TEMPLATE: &str = r#"Analyze the provided image, which is confirmed to be a page from a Profit and Loss Statement (P&L) or Income Statement.
Identify and extract key financial figures and information.

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears on the document, including currency symbols or formatting (like parentheses for negatives).
If a specific piece of information is not found, OMIT the key entirely from the JSON output.

Standardized Keys for P&L:
- DocumentType: (Should be "Profit and Loss Statement")
- BusinessName
- PropertyAddress: (Full street address, city, state, zip if associated with a specific property)
- ReportingPeriodStartDate
- ReportingPeriodEndDate
- TotalRevenue (or Sales, Income)
- CostOfGoodsSold (or Cost of Sales)
- GrossProfit
- AdvertisingExpense
- SalariesWagesExpense
- RentExpense
- UtilitiesExpense
- InsuranceExpense
- RepairsMaintenanceExpense
- OfficeSuppliesExpense
- LegalProfessionalExpense
- DepreciationExpense
- InterestExpense
- TaxesLicensesExpense
- TravelExpense
- MealsEntertainmentExpense
- BankChargesFeesExpense
- TotalOperatingExpenses
- OperatingIncome (or EBIT - Earnings Before Interest and Taxes)
- InterestIncome
- OtherIncome
- TotalOtherIncome
- OtherExpenses (non-operating)
- TotalOtherExpenses
- IncomeBeforeTax (or Pretax Income)
- IncomeTaxExpense
- NetIncomeLoss

The response MUST contain ONLY the JSON object and nothing else."#;

const CASH_FLOW_TEMPLATE: &str = r#"Analyze the provided image, which is confirmed to be a page from a Cash Flow Statement.
Identify and extract key financial figures and information, especially property address if present.

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears on the document, including currency symbols or formatting.
If a specific piece of information is not found, OMIT the key entirely from the JSON output.

Standardized Keys for Cash Flow:
- DocumentType: (Should be "Cash Flow Statement")
- BusinessName
- PropertyAddress: (Full street address, city, state, zip if associated with a specific property)
- ReportingPeriodStartDate
- ReportingPeriodEndDate
- TotalRevenue (or RentalIncome, OtherIncome)
- InsuranceExpense
- RepairsMaintenanceExpense
- TaxesExpense
- UtilitiesExpense
- ManagementFeeExpense
- MortgageInterestExpense
- OtherExpenseCategory: (e.g., HOA Dues, Supplies)
- OtherExpenseAmount
- TotalOperatingExpenses
- NetIncomeLoss (or NetCashFlow)

The response MUST contain ONLY the JSON object and nothing else."#;

const INVOICE_TEMPLATE: &str = r#"Analyze the provided image, which is confirmed to be a page from an Invoice.
Identify and extract key information.

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears.
If a specific piece of information is not found, OMIT the key.

Standardized Keys for Invoice:
- DocumentType: (Should be "Invoice")
- InvoiceNumber
- InvoiceDate
- DueDate
- VendorName (Seller Name)
- VendorAddress
- VendorPhoneNumber
- CustomerName (Buyer Name)
- CustomerAddress
- Description: (Brief description of overall service/product or line items)
- SubtotalAmount
- DiscountAmount
- TaxAmount (or VATAmount)
- ShippingHandlingAmount
- TotalAmount
- AmountPaid
- BalanceDue

The response MUST contain ONLY the JSON object and nothing else."#;

const FORM_1099_NEC_TEMPLATE: &str = r#"Analyze the provided image, which is confirmed to be a page from a 1099-NEC form.
Identify and extract information relevant to Form 1099-NEC (Nonemployee Compensation).

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears on the document. Omit keys if the information is not found.

Standardized Keys for 1099-NEC:
- DocumentType: (Should be "1099-NEC")
- TaxYear
- PayerName
- PayerAddress (Combine street, city, state, zip)
- PayerTIN
- RecipientName
- RecipientAddress (Combine street, city, state, zip)
- RecipientTIN
- NonemployeeCompensation: (Box 1)
- DirectSalesIndicator: (Box 2 Checkbox - return true/false or value if indicated)
- FederalIncomeTaxWithheld_1099NEC: (Box 4)
- StateTaxWithheld_1099NEC: (Box 5 - May have multiple state entries, extract as list if possible e.g., [{"StateTaxWithheld": "100.00", "StatePayerStateNo": "12345", "StateIncome": "5000.00"}])
- StatePayerStateNo_1099NEC: (Box 6)
- StateIncome_1099NEC: (Box 7)
- AccountNumber

The response MUST contain ONLY the JSON object and nothing else."#;

const FORM_1099_INT_TEMPLATE: &str = r#"Analyze the provided image, which is confirmed to be a page from a 1099-INT form.
Identify and extract information relevant to Form 1099-INT (Interest Income).

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears. Omit keys if the information is not found.

Standardized Keys for 1099-INT:
- DocumentType: (Should be "1099-INT")
- TaxYear
- PayerName
- PayerAddress (Combine street, city, state, zip)
- PayerTIN
- RecipientName
- RecipientAddress (Combine street, city, state, zip)
- RecipientTIN
- InterestIncome: (Box 1)
- EarlyWithdrawalPenalty: (Box 2)
- InterestOnUSTreasuryObligations: (Box 3)
- FederalIncomeTaxWithheld_1099INT: (Box 4)
- InvestmentExpenses: (Box 5)
- ForeignTaxPaid: (Box 6)
- ForeignCountryOrUSPossession: (Box 7)
- TaxExemptInterest: (Box 8)
- SpecifiedPrivateActivityBondInterest: (Box 9)
- MarketDiscount: (Box 10)
- BondPremium: (Box 11)
- BondPremiumUSTreasuryObligations: (Box 13)
- AccountNumber

The response MUST contain ONLY the JSON object and nothing else."#;

const FORM_1099_DIV_TEMPLATE: &str = r#"Analyze the provided image, which is confirmed to be a page from a 1099-DIV form.
Identify and extract information relevant to Form 1099-DIV (Dividends and Distributions).

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears. Omit keys if the information is not found.

Standardized Keys for 1099-DIV:
- DocumentType: (Should be "1099-DIV")
- TaxYear
- PayerName
- PayerAddress (Combine street, city, state, zip)
- PayerTIN
- RecipientName
- RecipientAddress (Combine street, city, state, zip)
- RecipientTIN
- TotalOrdinaryDividends: (Box 1a)
- QualifiedDividends: (Box 1b)
- TotalCapitalGainDistrib: (Box 2a)
- UnrecapSec1250Gain: (Box 2b)
- Section1202Gain: (Box 2c)
- CollectiblesGain28Percent: (Box 2d)
- NondividendDistributions: (Box 3)
- FederalIncomeTaxWithheld_1099DIV: (Box 4)
- InvestmentExpenses_1099DIV: (Box 5)
- Section199ADividends: (Box 6)
- ForeignTaxPaid: (Box 7)
- ForeignCountryOrUSPossession: (Box 8)
- CashLiquidationDistrib: (Box 10)
- NoncashLiquidationDistrib: (Box 11)
- ExemptInterestDividends: (Box 12)
- SpecifiedPrivateActivityBondInterestDividends: (Box 13)
- StateTaxWithheld_1099DIV: (Box 15 - May have multiple state entries)
- StateIdentificationNo_1099DIV: (Box 16)
- AccountNumber

The response MUST contain ONLY the JSON object and nothing else."#;

const FORM_1099_MISC_TEMPLATE: &str = r#"Analyze the provided image, which is confirmed to be a page from a 1099-MISC form.
Identify and extract information relevant to Form 1099-MISC (Miscellaneous Income).

Return the analysis STRICTLY as a single JSON object.
This JSON object should map standardized keys (listed below) to the extracted values found in the document.
Extract the value exactly as it appears. Omit keys if the information is not found.

Standardized Keys for 1099-MISC:
- DocumentType: (Should be "1099-MISC")
- TaxYear
- PayerName
- PayerAddress (Combine street, city, state, zip)
- PayerTIN
- RecipientName
- RecipientAddress (Combine street, city, state, zip)
- RecipientTIN
- Rents: (Box 1)
- Royalties: (Box 2)
- OtherIncome_1099MISC: (Box 3)
- FederalIncomeTaxWithheld_1099MISC: (Box 4)
- FishingBoatProceeds: (Box 5)
- MedicalHealthcarePayments: (Box 6)
- DirectSalesIndicator_1099MISC: (Box 7 Checkbox - $5000 or more of sales - return true/false)
- SubstitutePayments: (Box 8)
- CropInsuranceProceeds: (Box 9)
- GrossProceedsAttorney: (Box 10)
- FishPurchasedResale: (Box 11)
- Section409ADeferrals: (Box 12)
- ExcessGoldenParachute: (Box 14)
- NonqualifiedDeferredCompensation: (Box 15)
- StateTaxWithheld_1099MISC: (Box 16 - May have multiple state entries)
- StatePayerStateNo_1099MISC: (Box 17)
- StateIncome_1099MISC: (Box 18)
- AccountNumber

The response MUST contain ONLY the JSON object and nothing else."#;

/// Document types with a dedicated template, in lookup order.
pub const SPECIALIZED_TYPES: &[(&str, &str)] = &[
    ("W-2", W2_TEMPLATE),
    ("Profit and Loss Statement", PROFIT_AND_LOSS_TEMPLATE),
    ("Cash Flow Statement", CASH_FLOW_TEMPLATE),
    ("Invoice", INVOICE_TEMPLATE),
    ("1099-NEC", FORM_1099_NEC_TEMPLATE),
    ("1099-INT", FORM_1099_INT_TEMPLATE),
    ("1099-DIV", FORM_1099_DIV_TEMPLATE),
    ("1099-MISC", FORM_1099_MISC_TEMPLATE),
];

/// Which table entry produced a [`Template`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    /// A dedicated template for a known document family.
    Specialized,
    /// The generic fallback, possibly with the label substituted in.
    Generic,
}

/// An extraction instruction resolved for one document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub label: String,
    pub kind: TemplateKind,
    pub instruction: Cow<'static, str>,
}

impl Template {
    pub fn is_specialized(&self) -> bool {
        self.kind == TemplateKind::Specialized
    }

    pub fn as_str(&self) -> &str {
        &self.instruction
    }
}

/// Resolve the extraction template for a document-type label.
///
/// Total and deterministic. Labels are matched exactly (case-sensitive),
/// the way a classifier emits them.
pub fn template_for(doc_type: &str) -> Template {
    if let Some((_, instruction)) = SPECIALIZED_TYPES
        .iter()
        .find(|(label, _)| *label == doc_type)
    {
        return Template {
            label: doc_type.to_string(),
            kind: TemplateKind::Specialized,
            instruction: Cow::Borrowed(instruction),
        };
    }

    let instruction = if doc_type == OTHER_DOCUMENT_TYPE {
        Cow::Borrowed(GENERIC_TEMPLATE)
    } else {
        Cow::Owned(GENERIC_TEMPLATE.replacen(
            GENERIC_SUBJECT,
            &format!("a page from a document classified as '{doc_type}'"),
            1,
        ))
    };

    Template {
        label: doc_type.to_string(),
        kind: TemplateKind::Generic,
        instruction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_specialized_type_resolves_to_its_own_template() {
        for (label, instruction) in SPECIALIZED_TYPES {
            let t = template_for(label);
            assert!(t.is_specialized(), "{label} should be specialized");
            assert_eq!(t.as_str(), *instruction);
            assert!(
                t.as_str().contains(&format!("(Should be \"{label}\")")),
                "{label} template should pin its DocumentType"
            );
        }
    }

    #[test]
    fn template_for_is_deterministic() {
        for label in ["W-2", "Invoice", "Other", "Receipt", "Bank Statement"] {
            assert_eq!(template_for(label), template_for(label));
        }
    }

    #[test]
    fn unknown_label_is_substituted_verbatim() {
        let t = template_for("Receipt");
        assert_eq!(t.kind, TemplateKind::Generic);
        assert!(t
            .as_str()
            .starts_with("Analyze the provided image, which could be a page from a document classified as 'Receipt' (like W-2"));
        assert!(!t.as_str().contains(GENERIC_SUBJECT));
    }

    #[test]
    fn other_keeps_generic_phrase() {
        let t = template_for(OTHER_DOCUMENT_TYPE);
        assert_eq!(t.kind, TemplateKind::Generic);
        assert_eq!(t.as_str(), GENERIC_TEMPLATE);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let t = template_for("w-2");
        assert_eq!(t.kind, TemplateKind::Generic);
        assert!(t.as_str().contains("classified as 'w-2'"));
    }

    #[test]
    fn only_first_occurrence_is_replaced() {
        let t = template_for("Brokerage Statement");
        assert_eq!(t.as_str().matches("classified as 'Brokerage Statement'").count(), 1);
    }

    #[test]
    fn all_templates_demand_json_only() {
        assert!(GENERIC_TEMPLATE.ends_with("ONLY the JSON object and nothing else."));
        for (_, instruction) in SPECIALIZED_TYPES {
            assert!(instruction.ends_with("ONLY the JSON object and nothing else."));
        }
    }
}
