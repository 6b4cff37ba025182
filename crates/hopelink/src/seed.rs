//! Sample records written to an empty local store.

use serde_json::json;

use crate::record::Record;

/// The records a fresh local store starts with, newest-first.
#[must_use]
pub fn initial_records() -> Vec<Record> {
    let values = [
        json!({
            "id": "1700000000002",
            "sequenceNumber": 2,
            "centerName": "광주광역시 서구 치매안심센터",
            "serialNumber": "2300417",
            "deviceStatus": "정상",
            "applicationDate": "2024-03-12",
            "openingDate": "2024-03-15",
            "expirationDate": "2026-03-14",
            "name": "이순자",
            "gender": "여",
            "birthDate": "1941-11-02",
            "age": 84,
            "address": "광주광역시 서구 상무대로 1001",
            "detailAddress": "201호",
            "contact": "010-2345-6789",
            "contact2": "",
            "diagnosis": "알츠하이머",
            "missingExperience": "유",
            "missingCount": 2,
            "guardianName": "김민수",
            "guardianRelationship": "아들",
            "guardianGender": "남",
            "guardianBirthDate": "1968-04-20",
            "guardianContact1": "010-3456-7890",
            "guardianContact2": "",
            "guardianNote": "야간 배회 잦음",
            "usageStatus": "사용중",
            "nonUsageReason": "",
            "nonUsageAlternative": "",
            "patientRequest": "",
            "nonUsageEncouragement": "X",
            "nonUsagePlan": ""
        }),
        json!({
            "id": "1700000000001",
            "sequenceNumber": 1,
            "centerName": "광주광역시 동구 치매안심센터",
            "serialNumber": "2300102",
            "deviceStatus": "정상",
            "applicationDate": "2024-02-01",
            "openingDate": "2024-02-05",
            "expirationDate": "2026-02-04",
            "name": "박영호",
            "gender": "남",
            "birthDate": "1946-07-15",
            "age": 79,
            "address": "광주광역시 동구 금남로 245",
            "detailAddress": "",
            "contact": "010-1234-5678",
            "contact2": "",
            "diagnosis": "치매",
            "missingExperience": "무",
            "missingCount": 0,
            "guardianName": "박정희",
            "guardianRelationship": "배우자",
            "guardianGender": "여",
            "guardianBirthDate": "1949-01-30",
            "guardianContact1": "010-9876-5432",
            "guardianContact2": "",
            "guardianNote": "",
            "usageStatus": "미사용중",
            "nonUsageReason": "기기 착용 거부",
            "nonUsageAlternative": "배회인식표",
            "patientRequest": "손목형 기기 희망",
            "nonUsageEncouragement": "O",
            "nonUsagePlan": "다음 달 재방문 상담"
        }),
    ];

    values
        .into_iter()
        .filter_map(|value| Record::from_value(value).ok())
        .collect()
}
