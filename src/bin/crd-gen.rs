use kube::CustomResourceExt;
use storage_version_migrator_operator::KubeStorageVersionMigrator;

fn main() -> anyhow::Result<()> {
    let crd = KubeStorageVersionMigrator::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
