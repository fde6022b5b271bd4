use fabricate_generate::ProviderRegistry;

fn main() {
    let registry = ProviderRegistry::with_builtins();
    for (signature, id) in registry.signatures() {
        println!("{signature}\t{id}");
    }
    for (child, parent) in registry.categories() {
        println!("{child} -> {parent}");
    }
}
