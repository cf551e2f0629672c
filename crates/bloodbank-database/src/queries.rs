//! 数据库查询操作

use std::collections::HashSet;

use async_trait::async_trait;
use bloodbank_core::{
    BloodBankError, BloodRequest, Donation, DonationRecord, DonationStatus, Donor, Hospital,
    RequestStatus, Result, Transfer, TransferDetails,
};
use chrono::NaiveDate;
use sqlx::Row;
use uuid::Uuid;

use crate::connection::DatabasePool;
use crate::models::*;
use crate::store::BloodBankStore;

const DONATION_COLUMNS: &str = "d.blood_id, d.donor_id, d.hospital_id, d.blood_type, d.component_type, \
     d.volume_ml, d.collection_date, d.expiry_date, d.storage_location, d.status, d.created_at";

/// 数据库查询操作接口
pub struct DatabaseQueries<'a> {
    pool: &'a DatabasePool,
}

impl<'a> DatabaseQueries<'a> {
    pub fn new(pool: &'a DatabasePool) -> Self {
        Self { pool }
    }

    /// 创建数据库表
    pub async fn create_tables(&self) -> Result<()> {
        let pool = self.pool.pool();

        // 医院（账户）表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS hospitals (
                hospital_id UUID PRIMARY KEY,
                name VARCHAR(255) NOT NULL,
                email VARCHAR(255) UNIQUE NOT NULL,
                phone VARCHAR(64),
                address TEXT,
                city VARCHAR(128),
                state VARCHAR(128),
                postal_code VARCHAR(32),
                email_verified BOOLEAN NOT NULL DEFAULT FALSE,
                password_hash TEXT NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| BloodBankError::Database(e.to_string()))?;

        // 献血者表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS donors (
                donor_id UUID PRIMARY KEY,
                hospital_id UUID NOT NULL REFERENCES hospitals(hospital_id),
                first_name VARCHAR(128) NOT NULL,
                last_name VARCHAR(128) NOT NULL,
                date_of_birth DATE,
                gender VARCHAR(32),
                phone VARCHAR(64),
                email VARCHAR(255),
                address TEXT,
                city VARCHAR(128),
                state VARCHAR(128),
                postal_code VARCHAR(32),
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| BloodBankError::Database(e.to_string()))?;

        // 血液单位表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS donations (
                blood_id VARCHAR(32) PRIMARY KEY,
                donor_id UUID NOT NULL REFERENCES donors(donor_id),
                hospital_id UUID NOT NULL REFERENCES hospitals(hospital_id),
                blood_type VARCHAR(3) NOT NULL,
                component_type VARCHAR(64) NOT NULL,
                volume_ml INTEGER NOT NULL,
                collection_date DATE NOT NULL,
                expiry_date DATE NOT NULL,
                storage_location VARCHAR(128),
                status VARCHAR(16) NOT NULL DEFAULT 'available',
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| BloodBankError::Database(e.to_string()))?;

        // 用血请求表
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS blood_requests (
                request_id UUID PRIMARY KEY,
                hospital_id UUID NOT NULL REFERENCES hospitals(hospital_id),
                patient_name VARCHAR(255) NOT NULL,
                patient_age INTEGER,
                blood_type VARCHAR(16) NOT NULL,
                urgency VARCHAR(16) NOT NULL DEFAULT 'routine',
                units_needed INTEGER NOT NULL DEFAULT 1,
                contact_number VARCHAR(64) NOT NULL,
                address TEXT,
                medical_notes TEXT,
                requester_name VARCHAR(255),
                requester_email VARCHAR(255),
                status VARCHAR(16) NOT NULL DEFAULT 'pending',
                hospital_notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                responded_at TIMESTAMP WITH TIME ZONE
            )
        "#).execute(pool).await.map_err(|e| BloodBankError::Database(e.to_string()))?;

        // 调拨表，blood_id 唯一保证一个单位只调拨一次
        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS transfers (
                transfer_id UUID PRIMARY KEY,
                blood_id VARCHAR(32) UNIQUE NOT NULL REFERENCES donations(blood_id),
                request_id UUID NOT NULL REFERENCES blood_requests(request_id),
                hospital_id UUID NOT NULL REFERENCES hospitals(hospital_id),
                transfer_date TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                notes TEXT,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#).execute(pool).await.map_err(|e| BloodBankError::Database(e.to_string()))?;

        self.create_indexes().await?;

        tracing::info!("Database tables created successfully");
        Ok(())
    }

    /// 创建数据库索引
    async fn create_indexes(&self) -> Result<()> {
        let pool = self.pool.pool();

        let indexes = vec![
            "CREATE INDEX IF NOT EXISTS idx_hospitals_email_lower ON hospitals(LOWER(email))",
            "CREATE INDEX IF NOT EXISTS idx_donors_hospital_id ON donors(hospital_id)",
            "CREATE INDEX IF NOT EXISTS idx_donations_hospital_id ON donations(hospital_id)",
            "CREATE INDEX IF NOT EXISTS idx_donations_status_expiry ON donations(status, expiry_date)",
            "CREATE INDEX IF NOT EXISTS idx_donations_blood_type ON donations(blood_type)",
            "CREATE INDEX IF NOT EXISTS idx_requests_hospital_status ON blood_requests(hospital_id, status)",
            "CREATE INDEX IF NOT EXISTS idx_transfers_hospital_id ON transfers(hospital_id)",
            "CREATE INDEX IF NOT EXISTS idx_transfers_request_id ON transfers(request_id)",
        ];

        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(|e| BloodBankError::Database(e.to_string()))?;
        }

        tracing::info!("Database indexes created successfully");
        Ok(())
    }

    // ========== 医院相关操作 ==========

    pub async fn create_hospital(&self, hospital: &NewHospital) -> Result<Hospital> {
        let row = sqlx::query_as::<_, DbHospital>(r#"
            INSERT INTO hospitals (hospital_id, name, email, phone, address, city, state, postal_code, email_verified, password_hash)
            VALUES ($1, $2, LOWER($3), $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
        "#)
        .bind(hospital.hospital_id)
        .bind(&hospital.name)
        .bind(&hospital.email)
        .bind(&hospital.phone)
        .bind(&hospital.address)
        .bind(&hospital.city)
        .bind(&hospital.state)
        .bind(&hospital.postal_code)
        .bind(hospital.email_verified)
        .bind(&hospital.password_hash)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(Hospital::from(row))
    }

    pub async fn get_hospital(&self, hospital_id: Uuid) -> Result<Option<Hospital>> {
        let result = sqlx::query_as::<_, DbHospital>("SELECT * FROM hospitals WHERE hospital_id = $1")
            .bind(hospital_id)
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(result.map(Hospital::from))
    }

    pub async fn find_hospital_by_email(&self, email: &str) -> Result<Option<Hospital>> {
        let result = sqlx::query_as::<_, DbHospital>("SELECT * FROM hospitals WHERE LOWER(email) = LOWER($1)")
            .bind(email.trim())
            .fetch_optional(self.pool.pool())
            .await?;

        Ok(result.map(Hospital::from))
    }

    pub async fn set_email_verified(&self, hospital_id: Uuid) -> Result<()> {
        let affected = sqlx::query("UPDATE hospitals SET email_verified = TRUE WHERE hospital_id = $1")
            .bind(hospital_id)
            .execute(self.pool.pool())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(BloodBankError::NotFound(format!("Hospital {}", hospital_id)));
        }
        Ok(())
    }

    pub async fn update_password(&self, hospital_id: Uuid, password_hash: &str) -> Result<()> {
        let affected = sqlx::query("UPDATE hospitals SET password_hash = $2 WHERE hospital_id = $1")
            .bind(hospital_id)
            .bind(password_hash)
            .execute(self.pool.pool())
            .await?
            .rows_affected();

        if affected == 0 {
            return Err(BloodBankError::NotFound(format!("Hospital {}", hospital_id)));
        }
        Ok(())
    }

    // ========== 献血者相关操作 ==========

    pub async fn create_donor(&self, donor: &NewDonor) -> Result<Donor> {
        let row = sqlx::query_as::<_, DbDonor>(r#"
            INSERT INTO donors (donor_id, hospital_id, first_name, last_name, date_of_birth, gender,
                                phone, email, address, city, state, postal_code)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
        "#)
        .bind(donor.donor_id)
        .bind(donor.hospital_id)
        .bind(&donor.first_name)
        .bind(&donor.last_name)
        .bind(donor.date_of_birth)
        .bind(&donor.gender)
        .bind(&donor.phone)
        .bind(&donor.email)
        .bind(&donor.address)
        .bind(&donor.city)
        .bind(&donor.state)
        .bind(&donor.postal_code)
        .fetch_one(self.pool.pool())
        .await?;

        Ok(Donor::from(row))
    }

    pub async fn list_donors(&self, hospital_id: Uuid) -> Result<Vec<Donor>> {
        let rows = sqlx::query_as::<_, DbDonor>(
            "SELECT * FROM donors WHERE hospital_id = $1 ORDER BY created_at DESC",
        )
        .bind(hospital_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows.into_iter().map(Donor::from).collect())
    }

    pub async fn get_donor(&self, hospital_id: Uuid, donor_id: Uuid) -> Result<Option<Donor>> {
        let row = sqlx::query_as::<_, DbDonor>(
            "SELECT * FROM donors WHERE hospital_id = $1 AND donor_id = $2",
        )
        .bind(hospital_id)
        .bind(donor_id)
        .fetch_optional(self.pool.pool())
        .await?;

        Ok(row.map(Donor::from))
    }

    // ========== 血液单位相关操作 ==========

    pub async fn create_donation(&self, donation: &NewDonation) -> Result<Donation> {
        let row = sqlx::query_as::<_, DbDonation>(r#"
            INSERT INTO donations (blood_id, donor_id, hospital_id, blood_type, component_type,
                                   volume_ml, collection_date, expiry_date, storage_location, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
        "#)
        .bind(&donation.blood_id)
        .bind(donation.donor_id)
        .bind(donation.hospital_id)
        .bind(donation.blood_type.label())
        .bind(&donation.component_type)
        .bind(donation.volume_ml)
        .bind(donation.collection_date)
        .bind(donation.expiry_date)
        .bind(&donation.storage_location)
        .bind(DonationStatus::Available.as_str())
        .fetch_one(self.pool.pool())
        .await?;

        tracing::debug!("Inserted donation {}", donation.blood_id);
        Donation::try_from(row)
    }

    pub async fn list_donations(&self, hospital_id: Uuid) -> Result<Vec<Donation>> {
        let rows = sqlx::query_as::<_, DbDonation>(
            "SELECT * FROM donations WHERE hospital_id = $1 ORDER BY created_at DESC",
        )
        .bind(hospital_id)
        .fetch_all(self.pool.pool())
        .await?;

        rows.into_iter().map(Donation::try_from).collect()
    }

    pub async fn list_donation_records(&self, hospital_id: Uuid) -> Result<Vec<DonationRecord>> {
        let sql = format!(
            "SELECT {}, dn.first_name, dn.last_name FROM donations d \
             LEFT JOIN donors dn ON dn.donor_id = d.donor_id \
             WHERE d.hospital_id = $1 ORDER BY d.created_at DESC",
            DONATION_COLUMNS
        );
        let rows = sqlx::query_as::<_, DbDonationRecord>(&sql)
            .bind(hospital_id)
            .fetch_all(self.pool.pool())
            .await?;

        rows.into_iter().map(DonationRecord::try_from).collect()
    }

    pub async fn get_donation(&self, hospital_id: Uuid, blood_id: &str) -> Result<Option<Donation>> {
        let row = sqlx::query_as::<_, DbDonation>(
            "SELECT * FROM donations WHERE hospital_id = $1 AND blood_id = $2",
        )
        .bind(hospital_id)
        .bind(blood_id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.map(Donation::try_from).transpose()
    }

    pub async fn mark_expired_donations(&self, today: NaiveDate) -> Result<u64> {
        let affected = sqlx::query(
            "UPDATE donations SET status = 'expired' WHERE status = 'available' AND expiry_date < $1",
        )
        .bind(today)
        .execute(self.pool.pool())
        .await?
        .rows_affected();

        Ok(affected)
    }

    // ========== 用血请求相关操作 ==========

    pub async fn create_request(&self, request: &NewBloodRequest) -> Result<BloodRequest> {
        let row = sqlx::query_as::<_, DbBloodRequest>(r#"
            INSERT INTO blood_requests (request_id, hospital_id, patient_name, patient_age, blood_type,
                                        urgency, units_needed, contact_number, address, medical_notes,
                                        requester_name, requester_email, status)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING *
        "#)
        .bind(request.request_id)
        .bind(request.hospital_id)
        .bind(&request.patient_name)
        .bind(request.patient_age)
        .bind(&request.blood_type)
        .bind(request.urgency.as_str())
        .bind(request.units_needed)
        .bind(&request.contact_number)
        .bind(&request.address)
        .bind(&request.medical_notes)
        .bind(&request.requester_name)
        .bind(&request.requester_email)
        .bind(RequestStatus::Pending.as_str())
        .fetch_one(self.pool.pool())
        .await?;

        BloodRequest::try_from(row)
    }

    pub async fn list_requests(&self, hospital_id: Uuid, status: Option<RequestStatus>) -> Result<Vec<BloodRequest>> {
        let rows = sqlx::query_as::<_, DbBloodRequest>(r#"
            SELECT * FROM blood_requests
            WHERE hospital_id = $1 AND ($2::VARCHAR IS NULL OR status = $2)
            ORDER BY created_at DESC
        "#)
        .bind(hospital_id)
        .bind(status.map(|s| s.as_str()))
        .fetch_all(self.pool.pool())
        .await?;

        rows.into_iter().map(BloodRequest::try_from).collect()
    }

    pub async fn get_request(&self, hospital_id: Uuid, request_id: Uuid) -> Result<Option<BloodRequest>> {
        let row = sqlx::query_as::<_, DbBloodRequest>(
            "SELECT * FROM blood_requests WHERE hospital_id = $1 AND request_id = $2",
        )
        .bind(hospital_id)
        .bind(request_id)
        .fetch_optional(self.pool.pool())
        .await?;

        row.map(BloodRequest::try_from).transpose()
    }

    pub async fn update_request_status(&self, change: &RequestStatusChange) -> Result<BloodRequest> {
        let row = sqlx::query_as::<_, DbBloodRequest>(r#"
            UPDATE blood_requests
            SET status = $4, hospital_notes = COALESCE($5, hospital_notes), responded_at = $6
            WHERE hospital_id = $1 AND request_id = $2 AND status = $3
            RETURNING *
        "#)
        .bind(change.hospital_id)
        .bind(change.request_id)
        .bind(change.expected.as_str())
        .bind(change.status.as_str())
        .bind(&change.hospital_notes)
        .bind(change.responded_at)
        .fetch_optional(self.pool.pool())
        .await?;

        match row {
            Some(row) => BloodRequest::try_from(row),
            None => Err(BloodBankError::Conflict(format!(
                "Request {} is no longer {}",
                change.request_id,
                change.expected.as_str()
            ))),
        }
    }

    // ========== 调拨相关操作 ==========

    /// 在一个事务中完成调拨
    pub async fn fulfill_request(&self, transfer: &NewTransfer) -> Result<Transfer> {
        let mut tx = self.pool.pool().begin().await?;

        let unit_updated = sqlx::query(
            "UPDATE donations SET status = 'transferred' \
             WHERE blood_id = $1 AND hospital_id = $2 AND status = 'available'",
        )
        .bind(&transfer.blood_id)
        .bind(transfer.hospital_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if unit_updated == 0 {
            tx.rollback().await?;
            return Err(BloodBankError::Conflict(format!(
                "Blood unit {} is not available",
                transfer.blood_id
            )));
        }

        let request_updated = sqlx::query(
            "UPDATE blood_requests SET status = 'fulfilled', responded_at = $3 \
             WHERE request_id = $1 AND hospital_id = $2 AND status = 'approved'",
        )
        .bind(transfer.request_id)
        .bind(transfer.hospital_id)
        .bind(transfer.transfer_date)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if request_updated == 0 {
            tx.rollback().await?;
            return Err(BloodBankError::Conflict(format!(
                "Request {} is not awaiting fulfilment",
                transfer.request_id
            )));
        }

        let row = sqlx::query_as::<_, DbTransfer>(r#"
            INSERT INTO transfers (transfer_id, blood_id, request_id, hospital_id, transfer_date, notes)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        "#)
        .bind(transfer.transfer_id)
        .bind(&transfer.blood_id)
        .bind(transfer.request_id)
        .bind(transfer.hospital_id)
        .bind(transfer.transfer_date)
        .bind(&transfer.notes)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!("Transfer {} committed for request {}", transfer.transfer_id, transfer.request_id);
        Ok(Transfer::from(row))
    }

    pub async fn list_transfers(&self, hospital_id: Uuid) -> Result<Vec<TransferDetails>> {
        let rows = sqlx::query_as::<_, DbTransferDetails>(r#"
            SELECT t.transfer_id, t.blood_id, t.request_id, t.hospital_id, t.transfer_date, t.notes, t.created_at,
                   d.donor_id, d.blood_type, d.component_type, d.volume_ml,
                   r.patient_name, r.blood_type AS requested_blood_type, r.urgency
            FROM transfers t
            LEFT JOIN donations d ON d.blood_id = t.blood_id
            LEFT JOIN blood_requests r ON r.request_id = t.request_id
            WHERE t.hospital_id = $1
            ORDER BY t.transfer_date DESC
        "#)
        .bind(hospital_id)
        .fetch_all(self.pool.pool())
        .await?;

        Ok(rows.into_iter().map(TransferDetails::from).collect())
    }

    pub async fn linked_blood_ids(&self, hospital_id: Uuid) -> Result<HashSet<String>> {
        let rows = sqlx::query("SELECT blood_id FROM transfers WHERE hospital_id = $1")
            .bind(hospital_id)
            .fetch_all(self.pool.pool())
            .await?;

        Ok(rows.into_iter().map(|row| row.get::<String, _>("blood_id")).collect())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(self.pool.pool())
            .await
            .map_err(|e| BloodBankError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl BloodBankStore for DatabasePool {
    async fn create_hospital(&self, hospital: NewHospital) -> Result<Hospital> {
        self.queries().create_hospital(&hospital).await
    }

    async fn get_hospital(&self, hospital_id: Uuid) -> Result<Option<Hospital>> {
        self.queries().get_hospital(hospital_id).await
    }

    async fn find_hospital_by_email(&self, email: &str) -> Result<Option<Hospital>> {
        self.queries().find_hospital_by_email(email).await
    }

    async fn set_email_verified(&self, hospital_id: Uuid) -> Result<()> {
        self.queries().set_email_verified(hospital_id).await
    }

    async fn update_password(&self, hospital_id: Uuid, password_hash: &str) -> Result<()> {
        self.queries().update_password(hospital_id, password_hash).await
    }

    async fn create_donor(&self, donor: NewDonor) -> Result<Donor> {
        self.queries().create_donor(&donor).await
    }

    async fn list_donors(&self, hospital_id: Uuid) -> Result<Vec<Donor>> {
        self.queries().list_donors(hospital_id).await
    }

    async fn get_donor(&self, hospital_id: Uuid, donor_id: Uuid) -> Result<Option<Donor>> {
        self.queries().get_donor(hospital_id, donor_id).await
    }

    async fn create_donation(&self, donation: NewDonation) -> Result<Donation> {
        self.queries().create_donation(&donation).await
    }

    async fn list_donations(&self, hospital_id: Uuid) -> Result<Vec<Donation>> {
        self.queries().list_donations(hospital_id).await
    }

    async fn list_donation_records(&self, hospital_id: Uuid) -> Result<Vec<DonationRecord>> {
        self.queries().list_donation_records(hospital_id).await
    }

    async fn get_donation(&self, hospital_id: Uuid, blood_id: &str) -> Result<Option<Donation>> {
        self.queries().get_donation(hospital_id, blood_id).await
    }

    async fn mark_expired_donations(&self, today: NaiveDate) -> Result<u64> {
        self.queries().mark_expired_donations(today).await
    }

    async fn create_request(&self, request: NewBloodRequest) -> Result<BloodRequest> {
        self.queries().create_request(&request).await
    }

    async fn list_requests(&self, hospital_id: Uuid, status: Option<RequestStatus>) -> Result<Vec<BloodRequest>> {
        self.queries().list_requests(hospital_id, status).await
    }

    async fn get_request(&self, hospital_id: Uuid, request_id: Uuid) -> Result<Option<BloodRequest>> {
        self.queries().get_request(hospital_id, request_id).await
    }

    async fn update_request_status(&self, change: RequestStatusChange) -> Result<BloodRequest> {
        self.queries().update_request_status(&change).await
    }

    async fn fulfill_request(&self, transfer: NewTransfer) -> Result<Transfer> {
        self.queries().fulfill_request(&transfer).await
    }

    async fn list_transfers(&self, hospital_id: Uuid) -> Result<Vec<TransferDetails>> {
        self.queries().list_transfers(hospital_id).await
    }

    async fn linked_blood_ids(&self, hospital_id: Uuid) -> Result<HashSet<String>> {
        self.queries().linked_blood_ids(hospital_id).await
    }

    async fn health_check(&self) -> Result<()> {
        self.queries().ping().await
    }
}
