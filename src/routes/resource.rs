use actix_multipart::Multipart;
use actix_web::{web, HttpResponse};
use aws_config::meta::region::RegionProviderChain;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use chrono::Utc;
use futures_util::StreamExt;
use log::{error, info};
use md5::{Digest, Md5};
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::auth::AuthUser;
use crate::config::AppConfig;
use crate::entity::resource;
use crate::error::{db_error, AppError};
use crate::response::ok;
use crate::sys_config as sys_config_store;

const STORAGE_LOCAL: &str = "LOCAL";
const STORAGE_AWSS3: &str = "AWSS3";

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/upload").route(web::post().to(upload)))
        .service(web::resource("/{public_id}").route(web::get().to(get_resource)));
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResourceResponse {
    public_id: String,
    url: String,
    suffix: String,
    storage_type: String,
    file_type: String,
    file_name: String,
    size: u64,
}

async fn upload(
    db: web::Data<DatabaseConnection>,
    config: web::Data<AppConfig>,
    auth: AuthUser,
    mut payload: Multipart,
) -> Result<HttpResponse, AppError> {
    let storage_type = sys_config_store::get_string(db.get_ref(), sys_config_store::STORAGE_TYPE)
        .await
        .map_err(db_error("read STORAGE_TYPE"))?
        .unwrap_or_else(|| STORAGE_LOCAL.to_string());

    let mut responses = Vec::new();

    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|_| AppError::fail("upload failed"))?;
        let filename = field
            .content_disposition()
            .get_filename()
            .map(|s| s.to_string())
            .unwrap_or_else(|| "file".to_string());

        let public_id = generate_public_id();
        let suffix = Path::new(&filename)
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase();

        let parent_dir = Utc::now().format("%Y%m%d").to_string();
        let file_name = if suffix.is_empty() {
            public_id.clone()
        } else {
            format!("{}.{}", public_id, suffix)
        };
        let target_path = PathBuf::from(&config.upload_storage_path)
            .join(parent_dir)
            .join(file_name);

        if let Some(parent) = target_path.parent() {
            fs::create_dir_all(parent).map_err(|_| AppError::fail("upload failed"))?;
        }

        let mut f = fs::File::create(&target_path).map_err(|_| AppError::fail("upload failed"))?;
        let mut hasher = Md5::new();
        let mut size: u64 = 0;

        while let Some(chunk) = field.next().await {
            let data = match chunk {
                Ok(data) => data,
                Err(_) => {
                    let _ = fs::remove_file(&target_path);
                    return Err(AppError::fail("upload failed"));
                }
            };
            size += data.len() as u64;
            if size > config.max_upload_bytes {
                drop(f);
                let _ = fs::remove_file(&target_path);
                return Err(AppError::file_size_limit(format!(
                    "file exceeds {} bytes",
                    config.max_upload_bytes
                )));
            }
            hasher.update(&data);
            if f.write_all(&data).is_err() {
                let _ = fs::remove_file(&target_path);
                return Err(AppError::fail("upload failed"));
            }
        }
        drop(f);

        let file_hash = format!("{:x}", hasher.finalize());
        let file_type = detect_file_type(&target_path, &suffix);

        let (url, storage) = match storage_type.as_str() {
            STORAGE_AWSS3 => {
                let s3_param = sys_config_store::get_string(db.get_ref(), sys_config_store::AWSS3_PARAM)
                    .await
                    .map_err(db_error("read AWSS3_PARAM"))?
                    .unwrap_or_default();
                match upload_awss3(&s3_param, &target_path, &public_id, &file_type).await {
                    Ok(url) => (url, STORAGE_AWSS3.to_string()),
                    Err(err) => {
                        let _ = fs::remove_file(&target_path);
                        return Err(err);
                    }
                }
            }
            _ => (format!("/api/resource/{}", public_id), STORAGE_LOCAL.to_string()),
        };

        let resource_model = resource::ActiveModel {
            public_id: Set(public_id.clone()),
            user_id: Set(auth.user_id),
            file_type: Set(file_type.clone()),
            file_name: Set(filename.clone()),
            file_hash: Set(file_hash),
            size: Set(size as i64),
            internal_path: Set(Some(target_path.to_string_lossy().to_string())),
            external_link: Set(Some(url.clone())),
            storage_type: Set(Some(storage.clone())),
            suffix: Set(Some(suffix.clone())),
            created: Set(Some(Utc::now())),
        };

        if let Err(err) = resource_model.insert(db.get_ref()).await {
            // the record is the only reference to the file
            let _ = fs::remove_file(&target_path);
            error!("insert resource failed: {}", err);
            return Err(AppError::system_exception());
        }

        if storage != STORAGE_LOCAL {
            let _ = fs::remove_file(&target_path);
        }
        info!("user {} uploaded {} ({} bytes, {})", auth.user_id, public_id, size, storage);

        responses.push(UploadResourceResponse {
            public_id,
            url,
            suffix,
            storage_type: storage,
            file_type,
            file_name: filename,
            size,
        });
    }

    if responses.is_empty() {
        return Err(AppError::param_error("no file uploaded"));
    }
    Ok(ok(responses))
}

async fn get_resource(
    db: web::Data<DatabaseConnection>,
    path: web::Path<String>,
) -> Result<HttpResponse, AppError> {
    let public_id = path.into_inner();
    let resource_item = resource::Entity::find_by_id(public_id)
        .one(db.get_ref())
        .await
        .map_err(db_error("find resource"))?
        .ok_or_else(|| AppError::fail("resource not found"))?;

    let storage_type = resource_item.storage_type.as_deref().unwrap_or(STORAGE_LOCAL);
    if storage_type == STORAGE_LOCAL {
        let file_path = resource_item.internal_path.unwrap_or_default();
        let data = tokio::fs::read(&file_path)
            .await
            .map_err(|_| AppError::fail("resource file is missing"))?;
        Ok(HttpResponse::Ok().content_type(resource_item.file_type).body(data))
    } else {
        let url = resource_item.external_link.unwrap_or_default();
        Ok(HttpResponse::Found()
            .append_header(("Location", url))
            .finish())
    }
}

fn generate_public_id() -> String {
    let prefix = Utc::now().format("%Y%m%d%H%M%S").to_string();
    let rand: String = (0..20)
        .map(|_| {
            let idx = rand::random::<u8>() % 26;
            (b'a' + idx) as char
        })
        .collect();
    format!("{}{}", prefix, rand)
}

fn detect_file_type(path: &Path, suffix: &str) -> String {
    if let Ok(Some(kind)) = infer::get_from_path(path) {
        return kind.mime_type().to_string();
    }
    if !suffix.is_empty() {
        if let Some(mime) = mime_guess::from_ext(suffix).first() {
            return mime.essence_str().to_string();
        }
    }
    "application/octet-stream".to_string()
}

async fn upload_awss3(param: &str, file_path: &Path, public_id: &str, file_type: &str) -> Result<String, AppError> {
    let json: Value = serde_json::from_str(param).map_err(|_| AppError::fail("AWSS3_PARAM is not valid json"))?;
    let field = |name: &str| json.get(name).and_then(|v| v.as_str()).unwrap_or("").to_string();
    let access_key = field("accessKey");
    let secret_key = field("secretKey");
    let bucket = field("bucket");
    let domain = field("domain");
    let prefix = field("prefix");
    let region = field("region");

    if access_key.is_empty() || secret_key.is_empty() || bucket.is_empty() || region.is_empty() {
        return Err(AppError::fail("AWSS3_PARAM is incomplete"));
    }

    let key = if prefix.is_empty() {
        public_id.to_string()
    } else {
        format!("{}/{}", prefix.trim_end_matches('/'), public_id)
    };

    let region_provider = RegionProviderChain::first_try(Region::new(region.clone()));
    let creds = aws_sdk_s3::config::Credentials::new(access_key, secret_key, None, None, "static");
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(region_provider)
        .credentials_provider(creds)
        .load()
        .await;

    let client = S3Client::new(&config);
    let data = tokio::fs::read(file_path)
        .await
        .map_err(|_| AppError::fail("upload failed"))?;

    client
        .put_object()
        .bucket(&bucket)
        .key(&key)
        .content_type(file_type)
        .acl(ObjectCannedAcl::PublicRead)
        .body(ByteStream::from(data))
        .send()
        .await
        .map_err(|e| {
            error!("s3 put_object failed: {}", e);
            AppError::fail("upload failed")
        })?;

    let url = if !domain.is_empty() {
        format!("{}/{}", domain.trim_end_matches('/'), key)
    } else {
        format!("https://s3.{}.amazonaws.com/{}/{}", region, bucket, key)
    };
    Ok(url)
}
