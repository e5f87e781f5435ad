use derive_more::{Display, Error};
use pricing_types::{Dimensions, TariffQuote};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;

/// Fixed return-handling charge added to the tariff before spreading it over
/// the expected sales per return.
const RETURNS_BASE: Decimal = dec!(50);
const SALES_PER_RETURN: Decimal = dec!(9);
const PRICE_STEP: Decimal = dec!(5);
/// Display markup bounds in basis points, upper bound exclusive.
const MARKUP_RANGE_BP: std::ops::Range<u32> = 13_000..15_000;

#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum PricingError {
    #[display("margin is unreachable with the given tax and commission")]
    InfeasibleMargin,
    #[display("solved price is negative")]
    NegativePrice,
    #[display("amount does not fit an integer")]
    Overflow,
}

fn round_half_away(d: Decimal) -> Decimal {
    d.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}

fn to_i64(d: Decimal) -> Result<i64, PricingError> {
    d.to_i64().ok_or(PricingError::Overflow)
}

fn checked(d: Option<Decimal>) -> Result<Decimal, PricingError> {
    d.ok_or(PricingError::Overflow)
}

pub fn volume_liters(d: &Dimensions) -> Result<Decimal, PricingError> {
    let area = checked(Decimal::from(d.width).checked_mul(Decimal::from(d.height)))?;
    let volume = checked(area.checked_mul(Decimal::from(d.length)))?;
    checked(volume.checked_div(dec!(1000)))
}

pub fn tariff(volume_liters: Decimal, base: Decimal, per_liter: Decimal) -> Result<Decimal, PricingError> {
    let extra = checked(volume_liters.checked_sub(Decimal::ONE))?;
    checked(checked(extra.checked_mul(per_liter))?.checked_add(base))
}

pub fn returns_reserve(tariff: Decimal) -> Result<Decimal, PricingError> {
    checked(checked(tariff.checked_add(RETURNS_BASE))?.checked_div(SALES_PER_RETURN))
}

pub fn purchase_cost(base_price: Decimal, pack_count: u32) -> Result<Decimal, PricingError> {
    Ok(checked(base_price.checked_mul(Decimal::from(pack_count)))?.ceil())
}

pub fn fixed_cost(
    purchase_cost: Decimal,
    tariff: Decimal,
    delivery_fee: Decimal,
    warehouse_fee: Decimal,
) -> Result<Decimal, PricingError> {
    [
        tariff.ceil(),
        delivery_fee,
        warehouse_fee,
        returns_reserve(tariff)?.ceil(),
    ]
    .into_iter()
    .try_fold(purchase_cost, |sum, part| checked(sum.checked_add(part)))
}

/// Price at which `desired_margin` of revenue remains after tax, commission
/// and fixed costs.
pub fn solve_price(
    desired_margin: Decimal,
    tax_rate: Decimal,
    commission_rate: Decimal,
    fixed_cost: Decimal,
) -> Result<Decimal, PricingError> {
    let denominator = Decimal::ONE - tax_rate - commission_rate - desired_margin;
    if denominator <= Decimal::ZERO {
        return Err(PricingError::InfeasibleMargin);
    }
    let price = checked(fixed_cost.checked_div(denominator))?;
    if price < Decimal::ZERO {
        return Err(PricingError::NegativePrice);
    }
    Ok(price)
}

pub fn commission_amount(solved_price: Decimal, commission_rate: Decimal) -> Result<i64, PricingError> {
    to_i64(checked(solved_price.checked_mul(commission_rate))?.trunc())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayPrice {
    pub price: i64,
    pub discount: i64,
}

/// Source of the "crossed out" price shown next to the solved one.
pub struct DisplayMarkup {
    rng: StdRng,
}

impl DisplayMarkup {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { rng }
    }

    pub fn sample_markup(&mut self) -> Decimal {
        Decimal::new(self.rng.gen_range(MARKUP_RANGE_BP) as i64, 4)
    }

    pub fn apply(&mut self, solved_price: Decimal) -> Result<DisplayPrice, PricingError> {
        let markup = self.sample_markup();
        display_price(solved_price, markup)
    }
}

pub fn display_price(solved_price: Decimal, markup: Decimal) -> Result<DisplayPrice, PricingError> {
    let marked_up = checked(solved_price.checked_mul(markup))?;
    let steps = round_half_away(checked(marked_up.checked_div(PRICE_STEP))?);
    let price = checked(steps.checked_mul(PRICE_STEP))?;
    let discount = if price.is_zero() {
        Decimal::ZERO
    } else {
        let share = checked(solved_price.checked_div(price))?;
        round_half_away(Decimal::ONE_HUNDRED - share * Decimal::ONE_HUNDRED)
    };
    Ok(DisplayPrice {
        price: to_i64(price)?,
        discount: to_i64(discount)?,
    })
}

/// Amounts computed for one card. `solved_price` is rounded to cents and is
/// the base for the commission and the display price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricedAmounts {
    pub cost: i64,
    pub tariff: Decimal,
    pub solved_price: Decimal,
    pub commission: i64,
}

/// Run-wide pricing parameters.
#[derive(Debug, Clone)]
pub struct PricingModel {
    pub desired_margin: Decimal,
    pub tax_rate: Decimal,
    pub commission_rate: Decimal,
    pub delivery_fee: Decimal,
    pub warehouse_fee: Decimal,
    pub tariff: TariffQuote,
    pub min_tariff: Option<Decimal>,
}

impl PricingModel {
    pub fn tariff_for(&self, dimensions: &Dimensions) -> Result<Decimal, PricingError> {
        let t = tariff(
            volume_liters(dimensions)?,
            self.tariff.base,
            self.tariff.per_liter,
        )?;
        Ok(match self.min_tariff {
            Some(min) => t.max(min),
            None => t,
        })
    }

    pub fn price(
        &self,
        dimensions: &Dimensions,
        base_price: Decimal,
        pack_count: u32,
    ) -> Result<PricedAmounts, PricingError> {
        let cost = purchase_cost(base_price, pack_count)?;
        let tariff = self.tariff_for(dimensions)?;
        let fixed_cost = fixed_cost(cost, tariff, self.delivery_fee, self.warehouse_fee)?;
        let solved_price = solve_price(
            self.desired_margin,
            self.tax_rate,
            self.commission_rate,
            fixed_cost,
        )?
        .round_dp(2);
        Ok(PricedAmounts {
            cost: to_i64(cost)?,
            tariff,
            solved_price,
            commission: commission_amount(solved_price, self.commission_rate)?,
        })
    }
}
