//! 库存统计与分析
//!
//! 基于某家医院的记录快照计算看板统计、低库存、临期单位、趋势分析和献血者活跃度。
//! 所有计算均为纯函数，"今天" 由调用方注入。

use std::collections::{BTreeMap, HashMap};

use bloodbank_core::{
    BloodRequest, BloodType, ComponentType, Donation, DonationStatus, Donor, RequestStatus, Urgency,
};
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::expiry::{days_until_expiry, is_expired};

/// 看板统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_units: usize,
    pub total_volume: i64,
    pub donor_count: usize,
    pub pending_transfers: usize,
    pub urgent_requests: usize,
    pub pending_requests: usize,
    /// 每种血型的在库可用量（ml），八种血型全部给出
    pub blood_type_inventory: BTreeMap<String, i64>,
}

/// 医院资料页附带的统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileStats {
    pub total_donors: usize,
    pub total_donations: usize,
    pub available_units: usize,
}

/// 低库存条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockItem {
    pub blood_type: String,
    pub unit_count: usize,
    pub total_volume_ml: i64,
    pub earliest_expiry: Option<NaiveDate>,
}

/// 临期血液单位
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiringUnit {
    pub blood_id: String,
    pub blood_type: String,
    pub component_type: String,
    pub volume_ml: i32,
    pub expiry_date: NaiveDate,
    pub collection_date: NaiveDate,
    pub storage_location: Option<String>,
    pub days_until_expiry: i64,
    pub donor_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyDonations {
    pub date: NaiveDate,
    pub count: usize,
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentShare {
    pub component_type: String,
    pub units: usize,
    pub volume: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BloodTypeTrend {
    pub date: NaiveDate,
    pub blood_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpiringByBloodType {
    pub blood_type: String,
    pub expiring_units: usize,
    pub expiring_volume: i64,
    pub min_days_left: i64,
    pub max_days_left: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorRegistrations {
    pub date: NaiveDate,
    pub new_donors: usize,
}

/// 趋势分析报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsReport {
    pub period_days: i64,
    pub donations_per_day: Vec<DailyDonations>,
    pub component_distribution: Vec<ComponentShare>,
    pub blood_type_trends: Vec<BloodTypeTrend>,
    pub expiring_by_blood_type: Vec<ExpiringByBloodType>,
    pub donor_registrations: Vec<DonorRegistrations>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentDonation {
    pub blood_id: String,
    pub donor_name: String,
    pub blood_type: String,
    pub collection_date: NaiveDate,
}

/// 献血者活跃度（近 7 天）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DonorActivity {
    pub total_donors: usize,
    pub donations_per_day: Vec<DailyDonations>,
    pub recent_donations: Vec<RecentDonation>,
}

impl DonorActivity {
    pub fn total_donations(&self) -> usize {
        self.donations_per_day.iter().map(|d| d.count).sum()
    }

    pub fn average_per_day(&self) -> f64 {
        if self.donations_per_day.is_empty() {
            return 0.0;
        }
        self.total_donations() as f64 / self.donations_per_day.len() as f64
    }
}

/// 临期分析固定看 7 天
const EXPIRING_WINDOW_DAYS: i64 = 7;
const ACTIVITY_WINDOW_DAYS: i64 = 7;
const RECENT_DONATIONS: usize = 5;
/// 分析窗口上限，防止超大查询参数生成巨量零填充
pub const MAX_WINDOW_DAYS: i64 = 366;

/// 单家医院的记录快照
#[derive(Debug, Clone, Copy)]
pub struct InventorySnapshot<'a> {
    pub donations: &'a [Donation],
    pub donors: &'a [Donor],
    pub requests: &'a [BloodRequest],
    pub today: NaiveDate,
}

impl<'a> InventorySnapshot<'a> {
    pub fn new(
        donations: &'a [Donation],
        donors: &'a [Donor],
        requests: &'a [BloodRequest],
        today: NaiveDate,
    ) -> Self {
        Self { donations, donors, requests, today }
    }

    /// 在库可用（状态 available 且未过期）的单位
    pub fn available_units(&self) -> impl Iterator<Item = &'a Donation> + '_ {
        let today = self.today;
        self.donations
            .iter()
            .filter(move |d| d.status == DonationStatus::Available && !is_expired(d.expiry_date, today))
    }

    fn donor_names(&self) -> HashMap<uuid::Uuid, String> {
        self.donors.iter().map(|d| (d.donor_id, d.full_name())).collect()
    }

    /// 看板统计
    pub fn dashboard_stats(&self) -> DashboardStats {
        let mut blood_type_inventory: BTreeMap<String, i64> =
            BloodType::ALL.iter().map(|t| (t.label(), 0)).collect();

        let mut total_units = 0;
        let mut total_volume = 0i64;
        for unit in self.available_units() {
            total_units += 1;
            total_volume += i64::from(unit.volume_ml);
            *blood_type_inventory.entry(unit.blood_type.label()).or_insert(0) += i64::from(unit.volume_ml);
        }

        let pending_requests = self
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Pending)
            .count();
        let urgent_requests = self
            .requests
            .iter()
            .filter(|r| {
                r.status == RequestStatus::Pending
                    && matches!(r.urgency, Urgency::Urgent | Urgency::Critical)
            })
            .count();
        let pending_transfers = self
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Approved)
            .count();

        DashboardStats {
            total_units,
            total_volume,
            donor_count: self.donors.len(),
            pending_transfers,
            urgent_requests,
            pending_requests,
            blood_type_inventory,
        }
    }

    pub fn profile_stats(&self) -> ProfileStats {
        ProfileStats {
            total_donors: self.donors.len(),
            total_donations: self.donations.len(),
            available_units: self.available_units().count(),
        }
    }

    /// 低于阈值的血型（按单位数升序）
    pub fn low_stock(&self, threshold: usize) -> Vec<LowStockItem> {
        let mut items: Vec<LowStockItem> = BloodType::ALL
            .iter()
            .map(|blood_type| {
                let units: Vec<&Donation> = self
                    .available_units()
                    .filter(|d| d.blood_type == *blood_type)
                    .collect();
                LowStockItem {
                    blood_type: blood_type.label(),
                    unit_count: units.len(),
                    total_volume_ml: units.iter().map(|d| i64::from(d.volume_ml)).sum(),
                    earliest_expiry: units.iter().map(|d| d.expiry_date).min(),
                }
            })
            .filter(|item| item.unit_count < threshold)
            .collect();

        // 稳定排序，单位数相同时保持血型表顺序
        items.sort_by_key(|item| item.unit_count);
        items
    }

    /// `days` 天内到期的可用单位
    pub fn expiring_units(&self, days: i64) -> Vec<ExpiringUnit> {
        let names = self.donor_names();
        let mut units: Vec<ExpiringUnit> = self
            .available_units()
            .filter_map(|d| {
                let left = days_until_expiry(d.expiry_date, self.today);
                (0..=days).contains(&left).then(|| ExpiringUnit {
                    blood_id: d.blood_id.clone(),
                    blood_type: d.blood_type.label(),
                    component_type: d.component_type.clone(),
                    volume_ml: d.volume_ml,
                    expiry_date: d.expiry_date,
                    collection_date: d.collection_date,
                    storage_location: d.storage_location.clone(),
                    days_until_expiry: left,
                    donor_name: names.get(&d.donor_id).cloned(),
                })
            })
            .collect();

        units.sort_by(|a, b| {
            a.expiry_date
                .cmp(&b.expiry_date)
                .then_with(|| a.blood_id.cmp(&b.blood_id))
        });
        units
    }

    /// 窗口内的日期序列（含今天，旧到新）
    fn window(&self, days: i64) -> Vec<NaiveDate> {
        let days = days.clamp(1, MAX_WINDOW_DAYS);
        (0..days)
            .rev()
            .map(|offset| self.today - Duration::days(offset))
            .collect()
    }

    fn donations_per_day(&self, dates: &[NaiveDate]) -> Vec<DailyDonations> {
        dates
            .iter()
            .map(|date| {
                let on_day = self.donations.iter().filter(|d| d.collection_date == *date);
                let (count, volume) = on_day.fold((0usize, 0i64), |(c, v), d| (c + 1, v + i64::from(d.volume_ml)));
                DailyDonations { date: *date, count, volume }
            })
            .collect()
    }

    /// 最近 `days` 天的趋势分析
    pub fn analytics(&self, days: i64) -> AnalyticsReport {
        let dates = self.window(days);
        let start = dates.first().copied().unwrap_or(self.today);

        let donations_per_day = self.donations_per_day(&dates);

        let mut component_distribution: Vec<ComponentShare> = Vec::new();
        for unit in self.available_units() {
            match component_distribution
                .iter_mut()
                .find(|c| c.component_type == unit.component_type)
            {
                Some(share) => {
                    share.units += 1;
                    share.volume += i64::from(unit.volume_ml);
                }
                None => component_distribution.push(ComponentShare {
                    component_type: unit.component_type.clone(),
                    units: 1,
                    volume: i64::from(unit.volume_ml),
                }),
            }
        }
        // 已知成分按标准顺序，其余按名称
        component_distribution.sort_by_key(|c| {
            let rank = ComponentType::ALL
                .iter()
                .position(|known| known.label() == c.component_type)
                .unwrap_or(ComponentType::ALL.len());
            (rank, c.component_type.clone())
        });

        let mut trend_counts: BTreeMap<(NaiveDate, BloodType), usize> = BTreeMap::new();
        for d in self
            .donations
            .iter()
            .filter(|d| d.collection_date >= start && d.collection_date <= self.today)
        {
            *trend_counts.entry((d.collection_date, d.blood_type)).or_insert(0) += 1;
        }
        let blood_type_trends = trend_counts
            .into_iter()
            .map(|((date, blood_type), count)| BloodTypeTrend {
                date,
                blood_type: blood_type.label(),
                count,
            })
            .collect();

        let expiring = self.expiring_units(EXPIRING_WINDOW_DAYS);
        let expiring_by_blood_type = BloodType::ALL
            .iter()
            .filter_map(|blood_type| {
                let label = blood_type.label();
                let group: Vec<&ExpiringUnit> = expiring.iter().filter(|u| u.blood_type == label).collect();
                let min_days_left = group.iter().map(|u| u.days_until_expiry).min()?;
                let max_days_left = group.iter().map(|u| u.days_until_expiry).max()?;
                Some(ExpiringByBloodType {
                    blood_type: label,
                    expiring_units: group.len(),
                    expiring_volume: group.iter().map(|u| i64::from(u.volume_ml)).sum(),
                    min_days_left,
                    max_days_left,
                })
            })
            .collect();

        let donor_registrations = dates
            .iter()
            .map(|date| DonorRegistrations {
                date: *date,
                new_donors: self
                    .donors
                    .iter()
                    .filter(|d| d.created_at.date_naive() == *date)
                    .count(),
            })
            .collect();

        AnalyticsReport {
            period_days: dates.len() as i64,
            donations_per_day,
            component_distribution,
            blood_type_trends,
            expiring_by_blood_type,
            donor_registrations,
        }
    }

    /// 近 7 天献血者活跃度与最近 5 次献血
    pub fn donor_activity(&self) -> DonorActivity {
        let dates = self.window(ACTIVITY_WINDOW_DAYS);
        let names = self.donor_names();

        let mut recent: Vec<&Donation> = self.donations.iter().collect();
        recent.sort_by(|a, b| {
            b.collection_date
                .cmp(&a.collection_date)
                .then_with(|| b.created_at.cmp(&a.created_at))
        });

        let recent_donations = recent
            .into_iter()
            .take(RECENT_DONATIONS)
            .map(|d| RecentDonation {
                blood_id: d.blood_id.clone(),
                donor_name: names.get(&d.donor_id).cloned().unwrap_or_else(|| "Unknown donor".to_string()),
                blood_type: d.blood_type.label(),
                collection_date: d.collection_date,
            })
            .collect();

        DonorActivity {
            total_donors: self.donors.len(),
            donations_per_day: self.donations_per_day(&dates),
            recent_donations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn donor(hospital_id: Uuid, first: &str, registered: NaiveDate) -> Donor {
        Donor {
            donor_id: Uuid::new_v4(),
            hospital_id,
            first_name: first.to_string(),
            last_name: "Doe".to_string(),
            date_of_birth: None,
            gender: None,
            phone: None,
            email: None,
            address: None,
            city: None,
            state: None,
            postal_code: None,
            created_at: registered.and_hms_opt(9, 0, 0).unwrap().and_utc(),
        }
    }

    fn donation(
        donor: &Donor,
        blood_id: &str,
        blood_type: BloodType,
        component: &str,
        collected: NaiveDate,
        expiry: NaiveDate,
    ) -> Donation {
        Donation {
            blood_id: blood_id.to_string(),
            donor_id: donor.donor_id,
            hospital_id: donor.hospital_id,
            blood_type,
            component_type: component.to_string(),
            volume_ml: 450,
            collection_date: collected,
            expiry_date: expiry,
            storage_location: Some("Fridge 1".to_string()),
            status: DonationStatus::Available,
            created_at: Utc::now(),
        }
    }

    fn request(hospital_id: Uuid, urgency: Urgency, status: RequestStatus) -> BloodRequest {
        BloodRequest {
            request_id: Uuid::new_v4(),
            hospital_id,
            patient_name: "Patient".to_string(),
            patient_age: None,
            blood_type: "A+".to_string(),
            urgency,
            units_needed: 1,
            contact_number: "555".to_string(),
            address: None,
            medical_notes: None,
            requester_name: None,
            requester_email: None,
            status,
            hospital_notes: None,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    struct Fixture {
        donors: Vec<Donor>,
        donations: Vec<Donation>,
        requests: Vec<BloodRequest>,
        today: NaiveDate,
    }

    fn fixture() -> Fixture {
        let hospital = Uuid::new_v4();
        let today = date(2025, 6, 10);
        let alice = donor(hospital, "Alice", date(2025, 6, 10));
        let bob = donor(hospital, "Bob", date(2025, 5, 1));

        let mut transferred = donation(&bob, "BLD-T", BloodType::A_POS, "Whole Blood", date(2025, 6, 1), date(2025, 7, 6));
        transferred.status = DonationStatus::Transferred;

        let donations = vec![
            donation(&alice, "BLD-1", BloodType::O_NEG, "Red Blood Cells", date(2025, 6, 9), date(2025, 7, 21)),
            donation(&alice, "BLD-2", BloodType::O_NEG, "Platelets", date(2025, 6, 8), date(2025, 6, 13)),
            donation(&bob, "BLD-3", BloodType::A_POS, "Whole Blood", date(2025, 5, 10), date(2025, 6, 14)),
            donation(&bob, "BLD-OLD", BloodType::B_POS, "Platelets", date(2025, 6, 1), date(2025, 6, 6)),
            transferred,
        ];

        let requests = vec![
            request(hospital, Urgency::Routine, RequestStatus::Pending),
            request(hospital, Urgency::Critical, RequestStatus::Pending),
            request(hospital, Urgency::Urgent, RequestStatus::Approved),
            request(hospital, Urgency::Urgent, RequestStatus::Fulfilled),
        ];

        Fixture { donors: vec![alice, bob], donations, requests, today }
    }

    #[test]
    fn test_dashboard_stats() {
        let f = fixture();
        let snapshot = InventorySnapshot::new(&f.donations, &f.donors, &f.requests, f.today);
        let stats = snapshot.dashboard_stats();

        // BLD-OLD 已过期，BLD-T 已调拨
        assert_eq!(stats.total_units, 3);
        assert_eq!(stats.total_volume, 1350);
        assert_eq!(stats.donor_count, 2);
        assert_eq!(stats.pending_requests, 2);
        assert_eq!(stats.urgent_requests, 1);
        assert_eq!(stats.pending_transfers, 1);
        assert_eq!(stats.blood_type_inventory.len(), 8);
        assert_eq!(stats.blood_type_inventory["O-"], 900);
        assert_eq!(stats.blood_type_inventory["B+"], 0);
    }

    #[test]
    fn test_dashboard_stats_serializes_camel_case() {
        let f = fixture();
        let snapshot = InventorySnapshot::new(&f.donations, &f.donors, &f.requests, f.today);
        let json = serde_json::to_value(snapshot.dashboard_stats()).unwrap();
        assert!(json.get("totalUnits").is_some());
        assert!(json.get("bloodTypeInventory").is_some());
    }

    #[test]
    fn test_low_stock() {
        let f = fixture();
        let snapshot = InventorySnapshot::new(&f.donations, &f.donors, &f.requests, f.today);

        let low = snapshot.low_stock(2);
        // O- 有两个单位，不在列表中
        assert_eq!(low.len(), 7);
        assert_eq!(low[0].unit_count, 0);
        let a_pos = low.iter().find(|i| i.blood_type == "A+").unwrap();
        assert_eq!(a_pos.unit_count, 1);
        assert_eq!(a_pos.earliest_expiry, Some(date(2025, 6, 14)));
        assert_eq!(low.last().unwrap().blood_type, "A+");

        assert!(snapshot.low_stock(0).is_empty());
    }

    #[test]
    fn test_expiring_units() {
        let f = fixture();
        let snapshot = InventorySnapshot::new(&f.donations, &f.donors, &f.requests, f.today);

        let expiring = snapshot.expiring_units(7);
        let ids: Vec<&str> = expiring.iter().map(|u| u.blood_id.as_str()).collect();
        assert_eq!(ids, vec!["BLD-2", "BLD-3"]);
        assert_eq!(expiring[0].days_until_expiry, 3);
        assert_eq!(expiring[0].donor_name.as_deref(), Some("Alice Doe"));

        assert_eq!(snapshot.expiring_units(3).len(), 1);
    }

    #[test]
    fn test_analytics() {
        let f = fixture();
        let snapshot = InventorySnapshot::new(&f.donations, &f.donors, &f.requests, f.today);
        let report = snapshot.analytics(30);

        assert_eq!(report.period_days, 30);
        assert_eq!(report.donations_per_day.len(), 30);
        assert_eq!(report.donations_per_day.last().unwrap().date, f.today);
        // BLD-3 采集于窗口之外
        let total: usize = report.donations_per_day.iter().map(|d| d.count).sum();
        assert_eq!(total, 4);

        assert_eq!(report.component_distribution[0].component_type, "Whole Blood");
        assert_eq!(report.component_distribution.len(), 3);

        let o_neg = report
            .expiring_by_blood_type
            .iter()
            .find(|e| e.blood_type == "O-")
            .unwrap();
        assert_eq!(o_neg.expiring_units, 1);
        assert_eq!(o_neg.min_days_left, 3);

        let registrations: usize = report.donor_registrations.iter().map(|r| r.new_donors).sum();
        assert_eq!(registrations, 1);

        assert_eq!(snapshot.analytics(0).period_days, 1);
        assert_eq!(snapshot.analytics(100_000).period_days, MAX_WINDOW_DAYS);
    }

    #[test]
    fn test_donor_activity() {
        let f = fixture();
        let snapshot = InventorySnapshot::new(&f.donations, &f.donors, &f.requests, f.today);
        let activity = snapshot.donor_activity();

        assert_eq!(activity.total_donors, 2);
        assert_eq!(activity.donations_per_day.len(), 7);
        assert_eq!(activity.donations_per_day.first().unwrap().date, date(2025, 6, 4));
        assert_eq!(activity.total_donations(), 2);
        assert!((activity.average_per_day() - 2.0 / 7.0).abs() < 1e-9);
        assert_eq!(activity.recent_donations.len(), 5);
        assert_eq!(activity.recent_donations[0].blood_id, "BLD-1");
    }

    #[test]
    fn test_profile_stats() {
        let f = fixture();
        let snapshot = InventorySnapshot::new(&f.donations, &f.donors, &f.requests, f.today);
        let stats = snapshot.profile_stats();
        assert_eq!(stats.total_donations, 5);
        assert_eq!(stats.available_units, 3);
    }
}
