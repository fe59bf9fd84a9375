pub const QUERY_DELETE_UNUSED_OTPS: &str = r#"
DELETE FROM otps WHERE phone_or_email=$1 AND used=0;
"#;

pub const QUERY_INSERT_OTP: &str = r#"
INSERT INTO otps(phone_or_email,otp_hash,attempts,expires_at,used,created_at)
VALUES($1,$2,$3,$4,$5,$6);
"#;

pub const QUERY_GET_LATEST_UNUSED_OTP: &str = r#"
SELECT id,phone_or_email,otp_hash,attempts,expires_at,used,created_at
FROM otps
WHERE phone_or_email=$1 AND used=0
ORDER BY created_at DESC, id DESC
LIMIT 1;
"#;

pub const QUERY_INCREMENT_OTP_ATTEMPTS: &str = r#"
UPDATE otps SET attempts=attempts+1 WHERE id=$1
RETURNING attempts;
"#;

pub const QUERY_GET_USERS_BY_PHONE_SUFFIX: &str = r#"
SELECT id,name,email,phone
FROM users
WHERE substr(REPLACE(REPLACE(REPLACE(REPLACE(REPLACE(phone,' ',''),'-',''),'+',''),'(',''),')',''),-10)=substr($1,-10)
ORDER BY id;
"#;

pub const QUERY_GET_USER_BY_EMAIL: &str = r#"
SELECT id,name,email,phone
FROM users
WHERE LOWER(TRIM(email))=$1
ORDER BY id
LIMIT 1;
"#;

pub const QUERY_INSERT_SCHEDULED_MESSAGE: &str = r#"
INSERT INTO whatsapp_scheduled_messages(
    template_id,automation_id,phone,message,scheduled_at,
    status,sent_at,error_message,created_at,updated_at
) VALUES($1,$2,$3,$4,$5,$6,$7,$8,$9,$10);
"#;

pub const QUERY_GET_SCHEDULED_MESSAGE: &str = r#"
SELECT
    id,template_id,automation_id,phone,message,scheduled_at,
    status,sent_at,error_message,created_at,updated_at
FROM whatsapp_scheduled_messages
WHERE id=$1;
"#;

pub const QUERY_GET_DUE_SCHEDULED_MESSAGES: &str = r#"
SELECT
    id,template_id,automation_id,phone,message,scheduled_at,
    status,sent_at,error_message,created_at,updated_at
FROM whatsapp_scheduled_messages
WHERE status='pending' AND scheduled_at<=$1
ORDER BY scheduled_at ASC, id ASC
LIMIT $2;
"#;

pub const QUERY_CLAIM_SCHEDULED_MESSAGE: &str = r#"
UPDATE whatsapp_scheduled_messages
SET status='sending', updated_at=$2
WHERE id=$1 AND status='pending';
"#;

pub const QUERY_MARK_SCHEDULED_SENT: &str = r#"
UPDATE whatsapp_scheduled_messages
SET status='sent', sent_at=$2, error_message=NULL, updated_at=$3
WHERE id=$1;
"#;

pub const QUERY_MARK_SCHEDULED_FAILED: &str = r#"
UPDATE whatsapp_scheduled_messages
SET status='failed', error_message=$2, updated_at=$3
WHERE id=$1;
"#;

pub const QUERY_CANCEL_SCHEDULED_MESSAGE: &str = r#"
UPDATE whatsapp_scheduled_messages
SET status='cancelled', updated_at=$2
WHERE id=$1 AND status='pending';
"#;

pub const QUERY_UPSERT_CHAT_SESSION: &str = r#"
INSERT INTO whatsapp_chat_sessions(
    customer_phone,customer_name,last_message,last_message_time,
    status,message_count,created_at,updated_at
) VALUES($1,$2,$3,$4,$5,1,$6,$6)
ON CONFLICT(customer_phone) DO UPDATE SET
    customer_name=COALESCE(excluded.customer_name,whatsapp_chat_sessions.customer_name),
    last_message=excluded.last_message,
    last_message_time=excluded.last_message_time,
    message_count=whatsapp_chat_sessions.message_count+1,
    updated_at=excluded.updated_at;
"#;

pub const QUERY_GET_CHAT_SESSION: &str = r#"
SELECT
    id,customer_phone,customer_name,last_message,last_message_time,
    status,message_count,created_at,updated_at
FROM whatsapp_chat_sessions
WHERE customer_phone=$1;
"#;

pub const QUERY_INSERT_INBOUND_MESSAGE: &str = r#"
INSERT INTO whatsapp_incoming_messages(
    message_id,from_phone,to_phone,message_type,message_text,
    media_url,timestamp,status,raw_payload,created_at
) VALUES($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
ON CONFLICT(message_id) DO NOTHING;
"#;

pub const QUERY_INSERT_MESSAGE_STATUS: &str = r#"
INSERT INTO whatsapp_message_status(
    message_id,status,timestamp,error_code,error_message,created_at
) VALUES($1,$2,$3,$4,$5,$6)
ON CONFLICT(message_id,status) DO NOTHING;
"#;

pub const QUERY_FIND_PENDING_COD_ORDERS: &str = r#"
SELECT id,order_number,customer_name,customer_phone,payment_method,status,created_at
FROM orders
WHERE
    substr(REPLACE(REPLACE(REPLACE(REPLACE(REPLACE(customer_phone,' ',''),'-',''),'+',''),'(',''),')',''),-10)=substr($1,-10)
    AND LOWER(payment_method) IN ($2,$3,$4)
    AND status IN ($5,$6)
ORDER BY created_at DESC, id DESC;
"#;

pub const QUERY_UPDATE_ORDER_STATUS: &str = r#"
UPDATE orders SET status=$2, updated_at=$3 WHERE id=$1;
"#;
