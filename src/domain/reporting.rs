// ============================================================================
// Revenue Reporter - Read-only aggregates over DELIVERED orders
// ============================================================================

use chrono::{Datelike, Days, NaiveDate, NaiveTime};
use serde::Serialize;
use std::sync::Arc;

use crate::domain::order::{Money, OrderError, RestaurantId};
use crate::store::{DriverOrderCount, MealPopularity, OrderStore, RevenueParty};

const DAYS_PER_WEEK: u64 = 7;
const TOP_N: usize = 3;

/// One calendar day (UTC) of a weekly revenue breakdown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayRevenue {
    /// Abbreviated weekday, `Mon`..`Sun`.
    pub label: String,
    pub date: NaiveDate,
    pub revenue: Money,
    pub orders: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyRevenue {
    pub week_start: NaiveDate,
    pub days: Vec<DayRevenue>,
}

impl WeeklyRevenue {
    pub fn total(&self) -> Money {
        self.days.iter().map(|d| d.revenue).sum()
    }

    pub fn revenue_for(&self, label: &str) -> Option<Money> {
        self.days.iter().find(|d| d.label == label).map(|d| d.revenue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestaurantReport {
    pub revenue: WeeklyRevenue,
    pub top_meals: Vec<MealPopularity>,
    pub top_drivers: Vec<DriverOrderCount>,
}

/// Monday of the week containing `date`.
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.weekday().num_days_from_monday()))
}

pub struct RevenueReporter {
    store: Arc<dyn OrderStore>,
}

impl RevenueReporter {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    /// Seven consecutive days from `week_start`, each summing the totals of
    /// the party's DELIVERED orders created that day.
    pub async fn revenue_by_weekday(
        &self,
        party: RevenueParty,
        week_start: NaiveDate,
    ) -> Result<WeeklyRevenue, OrderError> {
        let week_end = week_start
            .checked_add_days(Days::new(DAYS_PER_WEEK))
            .ok_or(OrderError::InvalidWeek(week_start))?;
        let from = week_start.and_time(NaiveTime::MIN).and_utc();
        let to = week_end.and_time(NaiveTime::MIN).and_utc();

        let mut days: Vec<DayRevenue> = (0..DAYS_PER_WEEK)
            .map(|offset| {
                let date = week_start
                    .checked_add_days(Days::new(offset))
                    .ok_or(OrderError::InvalidWeek(week_start))?;
                Ok(DayRevenue {
                    label: date.weekday().to_string(),
                    date,
                    revenue: Money::ZERO,
                    orders: 0,
                })
            })
            .collect::<Result<_, OrderError>>()?;

        for order in self.store.delivered_orders(party, from, to).await? {
            let offset = (order.created_at.date_naive() - week_start).num_days();
            let Some(day) = usize::try_from(offset).ok().and_then(|i| days.get_mut(i)) else {
                continue;
            };
            day.revenue = day
                .revenue
                .checked_add(order.total)
                .ok_or(OrderError::TotalOverflow)?;
            day.orders += 1;
        }

        Ok(WeeklyRevenue { week_start, days })
    }

    /// Weekly revenue plus the three most ordered meals and the three
    /// drivers with the most orders for the restaurant.
    pub async fn restaurant_report(
        &self,
        restaurant_id: RestaurantId,
        week_start: NaiveDate,
    ) -> Result<RestaurantReport, OrderError> {
        let revenue = self
            .revenue_by_weekday(RevenueParty::Restaurant(restaurant_id), week_start)
            .await?;
        let top_meals = self.store.meal_popularity(restaurant_id, TOP_N).await?;
        let top_drivers = self.store.driver_order_counts(restaurant_id, TOP_N).await?;

        Ok(RestaurantReport {
            revenue,
            top_meals,
            top_drivers,
        })
    }
}
